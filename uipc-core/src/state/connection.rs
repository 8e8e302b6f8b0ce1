//! Connection phase and the status line derived from it.

use std::fmt;
use std::time::{Duration, Instant};

use crate::network::Endpoint;

// ── ConnectionPhase ──────────────────────────────────────────────

/// Lifecycle of the link to the remote peer.
///
/// ```text
///  Disconnected ──(connect ok)──► Connected
///       ▲                             │
///       └──(I/O error, rejection)─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No socket. Initial state, and the state after any failure.
    #[default]
    Disconnected,

    /// A client is live.
    Connected {
        /// When the connection was established.
        since: Instant,
    },
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected { .. } => write!(f, "Connected"),
        }
    }
}

impl ConnectionPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the connection has been up. `None` while disconnected.
    pub fn connected_duration(&self) -> Option<Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            Self::Disconnected => None,
        }
    }
}

// ── BridgeStatus ─────────────────────────────────────────────────

/// What the host shows to the user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BridgeStatus {
    /// No connection attempt yet.
    #[default]
    Idle,
    Connected(Endpoint),
    /// The link dropped; the retry timer is running.
    Retrying(Endpoint),
    /// The last connect attempt failed.
    ConnectFailed { endpoint: Endpoint, reason: String },
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connected(ep) => write!(f, "Connected to {ep}"),
            Self::Retrying(ep) => write!(f, "Disconnected - retrying {ep}"),
            Self::ConnectFailed { endpoint, reason } => {
                write!(f, "Connect to {endpoint} failed: {reason}")
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_phase_is_disconnected() {
        let phase = ConnectionPhase::default();
        assert!(phase.is_disconnected());
        assert!(phase.connected_duration().is_none());
    }

    #[test]
    fn connected_phase_tracks_duration() {
        let phase = ConnectionPhase::Connected {
            since: Instant::now(),
        };
        assert!(phase.is_connected());
        assert!(phase.connected_duration().is_some());
    }

    #[test]
    fn display_format() {
        assert_eq!(ConnectionPhase::Disconnected.to_string(), "Disconnected");
        assert_eq!(
            ConnectionPhase::Connected {
                since: Instant::now()
            }
            .to_string(),
            "Connected"
        );
    }

    #[test]
    fn status_lines() {
        let ep = Endpoint::new("127.0.0.1", 9000);
        assert_eq!(BridgeStatus::Idle.to_string(), "Idle");
        assert_eq!(
            BridgeStatus::Connected(ep.clone()).to_string(),
            "Connected to 127.0.0.1:9000"
        );
        assert_eq!(
            BridgeStatus::Retrying(ep.clone()).to_string(),
            "Disconnected - retrying 127.0.0.1:9000"
        );
        assert_eq!(
            BridgeStatus::ConnectFailed {
                endpoint: ep,
                reason: "refused".into()
            }
            .to_string(),
            "Connect to 127.0.0.1:9000 failed: refused"
        );
    }
}
