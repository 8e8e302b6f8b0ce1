//! Reconnection state machine.
//!
//! Owns the live [`BridgeClient`] and decides when to open a new one.
//! Connection attempts happen either inline, once, when a request needs
//! a link, or from the host's retry timer. There is never a retry loop:
//! a failed attempt arms the timer and returns immediately.

use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::client::BridgeClient;
use crate::error::BridgeError;
use crate::network::{ClientOptions, Connector, Endpoint};
use crate::state::connection::{BridgeStatus, ConnectionPhase};

/// Period of the retry timer.
pub const RETRY_PERIOD: Duration = Duration::from_secs(1);

// ── RetryTimer ───────────────────────────────────────────────────

/// Periodic timer owned by the host; each expiry must end up in
/// [`Reconnector::on_tick`].
pub trait RetryTimer {
    fn arm(&mut self, period: Duration);
    fn disarm(&mut self);
}

/// A timer that only records calls. Ticks are delivered by hand.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ManualTimer {
    pub period: Option<Duration>,
    pub arm_calls: usize,
    pub disarm_calls: usize,
}

impl ManualTimer {
    pub fn is_armed(&self) -> bool {
        self.period.is_some()
    }
}

impl RetryTimer for ManualTimer {
    fn arm(&mut self, period: Duration) {
        self.period = Some(period);
        self.arm_calls += 1;
    }

    fn disarm(&mut self) {
        self.period = None;
        self.disarm_calls += 1;
    }
}

// ── Reconnector ──────────────────────────────────────────────────

enum Link<S> {
    Disconnected,
    Connected {
        client: BridgeClient<S>,
        since: Instant,
    },
}

/// Connection lifecycle around one [`BridgeClient`].
pub struct Reconnector<C: Connector, T: RetryTimer> {
    connector: C,
    timer: T,
    timer_armed: bool,
    endpoint: Endpoint,
    options: ClientOptions,
    link: Link<C::Stream>,
    status: BridgeStatus,
}

impl<C: Connector, T: RetryTimer> Reconnector<C, T> {
    /// Start disconnected; nothing is attempted until the first request
    /// or an explicit [`ensure_connected`](Self::ensure_connected).
    pub fn new(connector: C, timer: T, endpoint: Endpoint, options: ClientOptions) -> Self {
        Self {
            connector,
            timer,
            timer_armed: false,
            endpoint,
            options,
            link: Link::Disconnected,
            status: BridgeStatus::Idle,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        match &self.link {
            Link::Disconnected => ConnectionPhase::Disconnected,
            Link::Connected { since, .. } => ConnectionPhase::Connected { since: *since },
        }
    }

    pub fn status(&self) -> &BridgeStatus {
        &self.status
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn is_timer_armed(&self) -> bool {
        self.timer_armed
    }

    /// Make one connect attempt if there is no live client.
    pub async fn ensure_connected(&mut self) -> Result<(), BridgeError> {
        if matches!(self.link, Link::Connected { .. }) {
            return Ok(());
        }

        match self.connector.connect(&self.endpoint).await {
            Ok(stream) => {
                info!(endpoint = %self.endpoint, "connected to peer");
                self.link = Link::Connected {
                    client: BridgeClient::new(stream, &self.options),
                    since: Instant::now(),
                };
                self.status = BridgeStatus::Connected(self.endpoint.clone());
                self.disarm_timer();
                Ok(())
            }
            Err(source) => {
                warn!(endpoint = %self.endpoint, error = %source, "connect failed");
                self.status = BridgeStatus::ConnectFailed {
                    endpoint: self.endpoint.clone(),
                    reason: source.to_string(),
                };
                self.arm_timer();
                Err(BridgeError::Connect {
                    endpoint: self.endpoint.to_string(),
                    source,
                })
            }
        }
    }

    /// Retry timer expiry.
    pub async fn on_tick(&mut self) {
        if matches!(self.link, Link::Connected { .. }) {
            self.disarm_timer();
            return;
        }
        if let Err(e) = self.ensure_connected().await {
            debug!(error = %e, "retry attempt failed");
        }
    }

    /// Drop the live client, if any, and schedule reconnection.
    pub fn disconnect(&mut self, reason: impl fmt::Display) {
        if let Link::Connected { since, .. } = std::mem::replace(&mut self.link, Link::Disconnected)
        {
            info!(
                endpoint = %self.endpoint,
                up_for = ?since.elapsed(),
                %reason,
                "connection closed"
            );
        }
        self.status = BridgeStatus::Retrying(self.endpoint.clone());
        self.arm_timer();
    }

    /// Forward one block, connecting first if needed.
    ///
    /// Errors that leave the stream unusable close it before returning.
    pub async fn forward(&mut self, block: &mut [u8], tag: u32) -> Result<(), BridgeError> {
        self.ensure_connected().await?;

        let result = match &mut self.link {
            Link::Connected { client, .. } => client.forward(block, tag).await,
            Link::Disconnected => Err(BridgeError::ConnectionLost(io::Error::new(
                io::ErrorKind::NotConnected,
                "no live connection",
            ))),
        };

        if let Err(e) = &result {
            if e.closes_connection() {
                self.disconnect(e);
            }
        }
        result
    }

    /// Point at a new endpoint and connect to it right away.
    pub async fn restart(&mut self, endpoint: Endpoint) -> Result<(), BridgeError> {
        info!(from = %self.endpoint, to = %endpoint, "restarting bridge");
        self.close();
        self.endpoint = endpoint;
        self.status = BridgeStatus::Idle;
        self.ensure_connected().await
    }

    /// Drop the connection and stop the retry timer.
    pub fn shutdown(&mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Link::Connected { .. } = std::mem::replace(&mut self.link, Link::Disconnected) {
            info!(endpoint = %self.endpoint, "connection closed");
        }
        self.disarm_timer();
    }

    fn arm_timer(&mut self) {
        if !self.timer_armed {
            self.timer.arm(RETRY_PERIOD);
            self.timer_armed = true;
        }
    }

    fn disarm_timer(&mut self) {
        if self.timer_armed {
            self.timer.disarm();
            self.timer_armed = false;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
