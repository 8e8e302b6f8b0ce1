//! Request dispatcher.
//!
//! The host receives two shapes of request: a block handed over directly
//! in the message, and an offset into the shared region. [`BridgeContext`]
//! turns both into one forwarded block and reports whether the message
//! was handled. No error escapes this layer.

use std::fmt;

use tracing::{debug, error, trace, warn};

use crate::error::{BridgeError, MapError};
use crate::frame;
use crate::network::{Connector, Endpoint};
use crate::region::{REGION_LEN, RegionCache, RegionHandle, RegionSource};
use crate::state::{BridgeStatus, ConnectionPhase, Reconnector, RetryTimer};

/// Consecutive protocol faults after which the peer is reported broken.
pub const PROTOCOL_FAULT_STREAK: u32 = 3;

// ── Request / Disposition ────────────────────────────────────────

/// An inbound request from a local client.
#[derive(Debug)]
pub enum Request<'a> {
    /// Block carried in the message itself.
    Direct { tag: u32, block: &'a mut [u8] },
    /// Block living in the shared region named by `handle`, at `offset`.
    Region { handle: RegionHandle, offset: isize },
}

/// Why a request was not handled.
#[derive(Debug)]
pub enum RejectReason {
    NegativeOffset(isize),
    OffsetOutOfRange(usize),
    Map(MapError),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeOffset(o) => write!(f, "negative offset {o}"),
            Self::OffsetOutOfRange(o) => {
                write!(f, "offset {o} outside region of {REGION_LEN} bytes")
            }
            Self::Map(e) => write!(f, "{e}"),
        }
    }
}

/// Outcome reported back to the host message loop.
#[derive(Debug)]
pub enum Disposition {
    /// The block was sent; `ok` tells whether the reply was applied.
    Forwarded { ok: bool },
    /// Nothing to do.
    NoOp,
    Rejected(RejectReason),
}

impl Disposition {
    /// Whether the host should report the message as handled.
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Forwarded { .. } | Self::NoOp)
    }
}

// ── PeerHealth ───────────────────────────────────────────────────

/// Running counters over forwarded blocks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PeerHealth {
    pub forwarded: u64,
    pub failed: u64,
    /// Protocol faults since the last success.
    pub fault_streak: u32,
}

impl PeerHealth {
    fn record_success(&mut self) {
        self.forwarded += 1;
        self.fault_streak = 0;
    }

    /// Returns `true` when this failure completes a broken-peer streak.
    fn record_failure(&mut self, err: &BridgeError) -> bool {
        self.failed += 1;
        if !err.is_protocol_fault() {
            return false;
        }
        self.fault_streak += 1;
        self.fault_streak == PROTOCOL_FAULT_STREAK
    }
}

// ── BridgeContext ────────────────────────────────────────────────

/// Everything the bridge owns: the connection, the mapped region and
/// the peer's track record.
pub struct BridgeContext<C: Connector, T: RetryTimer, S: RegionSource> {
    link: Reconnector<C, T>,
    regions: RegionCache<S>,
    health: PeerHealth,
}

impl<C: Connector, T: RetryTimer, S: RegionSource> BridgeContext<C, T, S> {
    pub fn new(link: Reconnector<C, T>, regions: RegionCache<S>) -> Self {
        Self {
            link,
            regions,
            health: PeerHealth::default(),
        }
    }

    /// Forward `block` and overwrite it with the reply.
    ///
    /// Returns `false` on any failure, after logging it; `block` is then
    /// unchanged.
    pub async fn forward_block(&mut self, tag: u32, block: &mut [u8]) -> bool {
        Self::forward_with(&mut self.link, &mut self.health, tag, block).await
    }

    async fn forward_with(
        link: &mut Reconnector<C, T>,
        health: &mut PeerHealth,
        tag: u32,
        block: &mut [u8],
    ) -> bool {
        debug!(
            tag,
            len = block.len(),
            records = frame::records(block).count(),
            "forwarding block"
        );
        for (at, record) in frame::records(block) {
            trace!(at, ?record, "record");
        }

        match link.forward(block, tag).await {
            Ok(()) => {
                health.record_success();
                true
            }
            Err(e) => {
                warn!(tag, len = block.len(), error = %e, "forward failed");
                if health.record_failure(&e) {
                    error!(
                        endpoint = %link.endpoint(),
                        streak = health.fault_streak,
                        "peer protocol broken: repeated malformed replies"
                    );
                }
                false
            }
        }
    }

    /// Serve one request.
    pub async fn dispatch(&mut self, request: Request<'_>) -> Disposition {
        match request {
            Request::Direct { block, .. } if block.is_empty() => Disposition::NoOp,
            Request::Direct { tag, block } => Disposition::Forwarded {
                ok: self.forward_block(tag, block).await,
            },
            Request::Region { handle, offset } => self.dispatch_region(handle, offset).await,
        }
    }

    async fn dispatch_region(&mut self, handle: RegionHandle, offset: isize) -> Disposition {
        let Ok(offset) = usize::try_from(offset) else {
            warn!(%handle, offset, "negative region offset");
            return Disposition::Rejected(RejectReason::NegativeOffset(offset));
        };
        if offset == 0 && handle.is_null() {
            return Disposition::NoOp;
        }
        if offset >= REGION_LEN {
            warn!(%handle, offset, "region offset out of range");
            return Disposition::Rejected(RejectReason::OffsetOutOfRange(offset));
        }

        let region = match self.regions.ensure_mapped(handle) {
            Ok(region) => region,
            Err(e) => {
                warn!(%handle, error = %e, "cannot map shared region");
                return Disposition::Rejected(RejectReason::Map(e));
            }
        };

        let tail = &mut region.bytes_mut()[offset..];
        let available = tail.len();
        let len = frame::frame_length(tail, available).unwrap_or_else(|| {
            debug!(offset, available, "unparseable record, forwarding rest of region");
            available
        });

        let ok = Self::forward_with(&mut self.link, &mut self.health, 0, &mut tail[..len]).await;
        Disposition::Forwarded { ok }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    pub async fn ensure_connected(&mut self) -> Result<(), BridgeError> {
        self.link.ensure_connected().await
    }

    pub async fn on_tick(&mut self) {
        self.link.on_tick().await;
    }

    pub async fn restart(&mut self, endpoint: Endpoint) -> Result<(), BridgeError> {
        self.link.restart(endpoint).await
    }

    /// Release the region and close the connection.
    pub fn shutdown(&mut self) {
        self.regions.release();
        self.link.shutdown();
    }

    pub fn status(&self) -> &BridgeStatus {
        self.link.status()
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.link.phase()
    }

    pub fn health(&self) -> &PeerHealth {
        &self.health
    }

    pub fn link(&self) -> &Reconnector<C, T> {
        &self.link
    }

    pub fn regions(&self) -> &RegionCache<S> {
        &self.regions
    }
}

// ── Tests ────────────────────────────────────────────────────────
