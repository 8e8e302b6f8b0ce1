//! Wire messages exchanged with the remote peer.
//!
//! ```text
//! Bridge ──[{"cmd":"ipc","dwData":N,"cbData":LEN,"hex":"..."}]──► Peer
//! Peer   ──[{"ok":true,"replyHex":"...","replyDwData":N}]───────► Bridge
//!        ──[{"ok":false,"error":"..."}]──────────────────────────► Bridge
//! ```
//!
//! One request is in flight at a time; the next line from the peer is
//! always the reply to it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::BridgeError;
use crate::hex;

/// Value of the `cmd` field on every request.
pub const IPC_COMMAND: &str = "ipc";

// ── Request ──────────────────────────────────────────────────────

/// One forwarded block. Field order is the order on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcRequest {
    pub cmd: String,

    /// Correlation tag supplied by the local caller.
    #[serde(rename = "dwData")]
    pub dw_data: u32,

    /// Byte length of the block.
    #[serde(rename = "cbData")]
    pub cb_data: u32,

    /// The block as uppercase hex.
    pub hex: String,
}

impl IpcRequest {
    /// Build the request carrying `block`.
    pub fn new(block: &[u8], tag: u32) -> Result<Self, BridgeError> {
        let cb_data =
            u32::try_from(block.len()).map_err(|_| BridgeError::BlockTooLarge { len: block.len() })?;
        Ok(Self {
            cmd: IPC_COMMAND.to_string(),
            dw_data: tag,
            cb_data,
            hex: hex::encode(block),
        })
    }
}

// ── Reply ────────────────────────────────────────────────────────

/// The useful part of an accepted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcReply {
    pub reply_hex: String,
    pub reply_dw_data: Option<u32>,
}

impl IpcReply {
    /// Interpret one reply line.
    ///
    /// Anything that is not a JSON object with a truthy `ok` is a
    /// rejection. An accepted reply without a `replyHex` string is
    /// malformed.
    pub fn parse(line: &str) -> Result<Self, BridgeError> {
        let rejected = || BridgeError::RemoteRejected {
            reply: line.to_string(),
        };

        let value: Value = serde_json::from_str(line).map_err(|_| rejected())?;
        if !is_truthy(value.get("ok")) {
            let reason = value.get("error").and_then(Value::as_str).unwrap_or("");
            warn!(reply = line, error = reason, "peer rejected request");
            return Err(rejected());
        }

        let reply_hex = value
            .get("replyHex")
            .and_then(Value::as_str)
            .ok_or(BridgeError::MalformedReply("replyHex is missing or not a string"))?
            .to_string();

        let reply_dw_data = value
            .get("replyDwData")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok());

        Ok(Self {
            reply_hex,
            reply_dw_data,
        })
    }
}

/// `true`, or any non-zero number.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

// ── Tests ────────────────────────────────────────────────────────
