//! Domain-specific error types for the UIPC bridge.
//!
//! Every fallible core operation returns one of these typed errors. None
//! of them is fatal: the dispatcher converts them into a handled /
//! not-handled disposition for the host message loop.

use thiserror::Error;

use crate::region::RegionHandle;

// ── HexError ─────────────────────────────────────────────────────

/// Failure to turn a hex string back into bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    /// Odd length, or a digit pair that is not valid hexadecimal.
    #[error("malformed hex payload")]
    MalformedHex,

    /// The decoded bytes would not fit into the caller's buffer.
    #[error("decoded hex needs {needed} bytes but only {capacity} are available")]
    CapacityExceeded { needed: usize, capacity: usize },
}

// ── MapError ─────────────────────────────────────────────────────

/// Failure to resolve or map a shared region.
#[derive(Debug, Error)]
pub enum MapError {
    /// The handle could not be turned into a system object name.
    #[error("cannot resolve region handle {handle}: {reason}")]
    HandleResolutionFailed { handle: RegionHandle, reason: String },

    /// The named object could not be opened or mapped read/write.
    #[error("cannot map region `{name}`: {reason}")]
    MapFailed { name: String, reason: String },
}

// ── BridgeError ──────────────────────────────────────────────────

/// The canonical error type for forwarding a block to the remote peer.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Connection Errors ────────────────────────────────────────
    /// A connect attempt to the configured peer failed.
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The socket failed, hit EOF, or timed out mid-request.
    #[error("connection lost: {0}")]
    ConnectionLost(#[from] std::io::Error),

    // ── Protocol Errors ──────────────────────────────────────────
    /// The peer answered without a truthy `ok` field.
    #[error("peer rejected request: {reply}")]
    RemoteRejected { reply: String },

    /// The reply was accepted but carried no usable `replyHex` string.
    #[error("malformed reply: {0}")]
    MalformedReply(&'static str),

    /// The `replyHex` payload was not valid hex.
    #[error("reply payload: {0}")]
    Hex(#[from] HexError),

    /// The reply decoded to a different byte count than the request.
    #[error("reply length mismatch: sent {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The reply line outgrew the bounded read buffer.
    #[error("reply line exceeds {limit} bytes")]
    ReplyTooLarge { limit: usize },

    // ── Request Errors ───────────────────────────────────────────
    /// The block cannot be described by a 32-bit `cbData`.
    #[error("block of {len} bytes is too large to forward")]
    BlockTooLarge { len: usize },

    /// The request line could not be serialized.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl BridgeError {
    /// Whether this failure leaves the connection unusable.
    ///
    /// The state machine drops the connection and arms a retry for
    /// every error that returns `true` here.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost(_)
                | Self::RemoteRejected { .. }
                | Self::ReplyTooLarge { .. }
                | Self::LengthMismatch { .. }
        )
    }

    /// Whether the peer sent something that breaks the reply contract.
    ///
    /// Reconnecting does not cure these; a streak of them points at the
    /// peer's implementation rather than the link.
    pub fn is_protocol_fault(&self) -> bool {
        matches!(
            self,
            Self::MalformedReply(_) | Self::Hex(_) | Self::LengthMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Encoding(e.to_string())
    }
}
