//! Byte ↔ hex-string transform used to carry binary blocks inside the
//! JSON wire protocol.

use crate::error::HexError;

/// Encode `bytes` as uppercase hex, two digits per byte.
pub fn encode(bytes: &[u8]) -> String {
    ::hex::encode_upper(bytes)
}

/// Decode `text` into at most `capacity` bytes.
///
/// Length checks run before any digit is inspected: an odd length is
/// `MalformedHex`, and a payload that would not fit is
/// `CapacityExceeded` even if its digits are garbage.
pub fn decode(text: &str, capacity: usize) -> Result<Vec<u8>, HexError> {
    if text.len() % 2 != 0 {
        return Err(HexError::MalformedHex);
    }
    let needed = text.len() / 2;
    if needed > capacity {
        return Err(HexError::CapacityExceeded { needed, capacity });
    }
    ::hex::decode(text).map_err(|_| HexError::MalformedHex)
}

// ── Tests ────────────────────────────────────────────────────────
