//! Newline-delimited JSON framing for the bridge wire protocol.
//!
//! Outbound items are [`IpcRequest`]s, serialized as one JSON object
//! followed by `\n`. Inbound items are raw reply lines with the line
//! ending removed; interpreting them is left to the client so that a
//! garbled reply does not poison the stream.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::BridgeError;
use crate::wire::IpcRequest;

/// Default upper bound on a single reply line, in bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 256 * 1024;

/// Line codec with a bounded read buffer.
#[derive(Debug, Clone)]
pub struct IpcLineCodec {
    max_length: usize,
    /// Bytes of the buffer already searched for `\n`.
    next_index: usize,
}

impl IpcLineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for IpcLineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl Decoder for IpcLineCodec {
    type Item = BytesMut;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A line of exactly `max_length` bytes still needs room for `\n`.
        let read_to = src.len().min(self.max_length.saturating_add(1));

        match src[self.next_index..read_to].iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let newline = self.next_index + pos;
                self.next_index = 0;

                let mut line = src.split_to(newline + 1);
                line.truncate(newline);
                if line.last() == Some(&b'\r') {
                    line.truncate(newline - 1);
                }
                Ok(Some(line))
            }
            None if src.len() > self.max_length => Err(BridgeError::ReplyTooLarge {
                limit: self.max_length,
            }),
            None => {
                self.next_index = read_to;
                Ok(None)
            }
        }
    }
}

impl Encoder<IpcRequest> for IpcLineCodec {
    type Error = BridgeError;

    fn encode(&mut self, item: IpcRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)?;
        dst.reserve(json.len() + 1);
        dst.extend_from_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
