//! # uipc-bridge: UIPC host process
//!
//! Hosts the bridging engine from `uipc-core` inside a Win32 message
//! window. Local clients send state-exchange blocks to the window; each
//! block is forwarded to the remote peer over TCP and the reply is
//! written back before the message returns.

pub mod config;
pub mod host;
pub mod logging;
pub mod window;
