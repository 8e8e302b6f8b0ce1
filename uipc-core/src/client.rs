//! Single-connection request/reply client.
//!
//! The [`BridgeClient`] owns one framed stream and forwards one block at
//! a time: encode, send, read exactly one reply line, decode it back into
//! the caller's buffer. The buffer is only touched once the whole reply
//! has been validated.

use std::io;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::codec::IpcLineCodec;
use crate::error::{BridgeError, HexError};
use crate::hex;
use crate::network::ClientOptions;
use crate::wire::{IpcReply, IpcRequest};

/// A live connection to the remote peer.
#[derive(Debug)]
pub struct BridgeClient<T> {
    framed: Framed<T, IpcLineCodec>,
    io_timeout: Duration,
}

impl<T: AsyncRead + AsyncWrite + Unpin> BridgeClient<T> {
    pub fn new(stream: T, options: &ClientOptions) -> Self {
        Self {
            framed: Framed::new(stream, IpcLineCodec::new(options.max_line_len)),
            io_timeout: options.io_timeout,
        }
    }

    /// Send `block` tagged with `tag` and overwrite it with the reply.
    ///
    /// On any error `block` is left exactly as it was.
    pub async fn forward(&mut self, block: &mut [u8], tag: u32) -> Result<(), BridgeError> {
        let request = IpcRequest::new(block, tag)?;

        timeout(self.io_timeout, self.framed.send(request))
            .await
            .map_err(|_| timed_out("send", self.io_timeout))??;

        let line = match timeout(self.io_timeout, self.framed.next())
            .await
            .map_err(|_| timed_out("reply", self.io_timeout))?
        {
            Some(line) => line?,
            None => {
                return Err(BridgeError::ConnectionLost(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the connection",
                )));
            }
        };

        let line = std::str::from_utf8(&line)
            .map_err(|_| BridgeError::MalformedReply("reply is not valid UTF-8"))?;
        let reply = IpcReply::parse(line)?;

        let expected = block.len();
        let decoded = hex::decode(&reply.reply_hex, expected).map_err(|e| match e {
            HexError::CapacityExceeded { needed, .. } => BridgeError::LengthMismatch {
                expected,
                actual: needed,
            },
            other => BridgeError::Hex(other),
        })?;
        if decoded.len() != expected {
            warn!(expected, actual = decoded.len(), "reply length differs from request");
            return Err(BridgeError::LengthMismatch {
                expected,
                actual: decoded.len(),
            });
        }

        if let Some(reply_tag) = reply.reply_dw_data.filter(|t| *t != tag) {
            debug!(tag, reply_tag, "reply carries a different tag");
        }

        block.copy_from_slice(&decoded);
        Ok(())
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> T {
        self.framed.into_inner()
    }
}

fn timed_out(stage: &str, after: Duration) -> BridgeError {
    BridgeError::ConnectionLost(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{stage} timed out after {after:?}"),
    ))
}

// ── Tests ────────────────────────────────────────────────────────
