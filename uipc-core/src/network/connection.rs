use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::codec::DEFAULT_MAX_LINE_LEN;

// ── Endpoint ─────────────────────────────────────────────────────

/// Host and port of the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Options ──────────────────────────────────────────────────────

/// Timeouts and limits applied to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Upper bound on sending a request, and separately on receiving its reply.
    pub io_timeout: Duration,
    /// Longest reply line accepted, in bytes.
    pub max_line_len: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(5),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

// ── Connector ────────────────────────────────────────────────────

/// Opens byte streams to an [`Endpoint`].
#[async_trait]
pub trait Connector: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Make one connection attempt.
    async fn connect(&mut self, endpoint: &Endpoint) -> io::Result<Self::Stream>;
}

/// Plain TCP with a connect timeout and Nagle disabled.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&mut self, endpoint: &Endpoint) -> io::Result<TcpStream> {
        let addr = (endpoint.host(), endpoint.port());
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no answer within {:?}", self.connect_timeout),
                )
            })??;
        stream.set_nodelay(true)?;
        debug!(%endpoint, local = ?stream.local_addr().ok(), "tcp connected");
        Ok(stream)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display() {
        let ep = Endpoint::new("10.0.0.5", 9000);
        assert_eq!(ep.to_string(), "10.0.0.5:9000");
        assert_eq!(ep.host(), "10.0.0.5");
        assert_eq!(ep.port(), 9000);
    }

    #[tokio::test]
    async fn tcp_connector_reaches_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut connector = TcpConnector::new(Duration::from_secs(2));
        let stream = connector
            .connect(&Endpoint::new("127.0.0.1", port))
            .await
            .unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn tcp_connector_reports_refusal() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let mut connector = TcpConnector::new(Duration::from_secs(2));
        assert!(connector.connect(&Endpoint::new("127.0.0.1", port)).await.is_err());
    }
}
