//! # uipc-core
//!
//! Bridging engine that re-exports local UIPC state exchanges as
//! line-delimited JSON over TCP.
//!
//! This crate contains:
//! - **Hex**: byte ↔ uppercase-hex transform for the wire payloads
//! - **Frame**: state-exchange record layouts and `frame_length`
//! - **Region**: `RegionCache` over a pluggable `RegionSource` (Win32 atoms or mapped files)
//! - **Codec**: `IpcLineCodec` for framed TCP I/O via `tokio_util`
//! - **Client**: `BridgeClient`, one request/reply at a time with copy-on-success
//! - **State**: `ConnectionPhase`, `BridgeStatus` and the `Reconnector` state machine
//! - **Dispatch**: `BridgeContext`, turning host requests into handled/not-handled
//! - **Error**: `BridgeError`, `MapError`, `HexError`: typed, `thiserror`-based

pub mod client;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod hex;
pub mod network;
pub mod region;
pub mod state;
pub mod wire;

#[cfg(test)]
mod testing;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::BridgeClient;
pub use codec::IpcLineCodec;
pub use dispatch::{BridgeContext, Disposition, PeerHealth, RejectReason, Request};
pub use error::{BridgeError, HexError, MapError};
pub use frame::{Record, frame_length};
pub use network::{ClientOptions, Connector, Endpoint, TcpConnector};
pub use region::{DirRegionSource, REGION_LEN, RegionCache, RegionHandle, RegionSource};
pub use state::{BridgeStatus, ConnectionPhase, ManualTimer, Reconnector, RetryTimer};
pub use wire::{IpcReply, IpcRequest};

#[cfg(target_os = "windows")]
pub use region::AtomRegionSource;
