//! State-exchange record layouts and the frame parser.
//!
//! A block written by an IPC client is a chain of self-describing
//! records, little-endian, with no alignment guarantees:
//!
//! ```text
//!  Terminator   id=0
//!  ReadState    id=1 | offset:u32 | byteCount:u32 | destPtr:u32 | payload[byteCount]
//!  WriteState   id=2 | offset:u32 | byteCount:u32 |               payload[byteCount]
//! ```
//!
//! The buffer comes from another process, so every declared length is
//! checked against the bytes actually available before it is used.

/// Identifier of the record that ends a chain.
pub const TERMINATOR_ID: u32 = 0;
/// Identifier of a read-state record.
pub const READ_STATE_ID: u32 = 1;
/// Identifier of a write-state record.
pub const WRITE_STATE_ID: u32 = 2;

/// Size of the terminator record.
pub const TERMINATOR_LEN: usize = 4;
/// Size of the fixed read-state header.
pub const READ_HEADER_LEN: usize = 16;
/// Size of the fixed write-state header.
pub const WRITE_HEADER_LEN: usize = 12;

// ── Headers ──────────────────────────────────────────────────────

/// Fixed header of a read-state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadStateHeader {
    pub offset: u32,
    pub byte_count: u32,
    pub dest_ptr: u32,
}

/// Fixed header of a write-state record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStateHeader {
    pub offset: u32,
    pub byte_count: u32,
}

/// One well-formed record at the start of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Terminator,
    ReadState(ReadStateHeader),
    WriteState(WriteStateHeader),
}

impl Record {
    /// Parse the record at the start of `buf`.
    ///
    /// Returns `None` for an unknown identifier, a truncated header, or a
    /// payload that runs past the end of `buf`.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let record = match read_u32_le(buf, 0)? {
            TERMINATOR_ID => Self::Terminator,
            READ_STATE_ID => Self::ReadState(ReadStateHeader {
                offset: read_u32_le(buf, 4)?,
                byte_count: read_u32_le(buf, 8)?,
                dest_ptr: read_u32_le(buf, 12)?,
            }),
            WRITE_STATE_ID => Self::WriteState(WriteStateHeader {
                offset: read_u32_le(buf, 4)?,
                byte_count: read_u32_le(buf, 8)?,
            }),
            _ => return None,
        };

        (record.encoded_len()? <= buf.len()).then_some(record)
    }

    /// Header size plus payload size.
    ///
    /// `None` only when the declared payload cannot be represented in
    /// `usize` on this target.
    pub fn encoded_len(&self) -> Option<usize> {
        match self {
            Self::Terminator => Some(TERMINATOR_LEN),
            Self::ReadState(h) => {
                READ_HEADER_LEN.checked_add(usize::try_from(h.byte_count).ok()?)
            }
            Self::WriteState(h) => {
                WRITE_HEADER_LEN.checked_add(usize::try_from(h.byte_count).ok()?)
            }
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Terminator)
    }
}

// ── Frame length ─────────────────────────────────────────────────

/// Length of the single record starting at `buffer[0]`.
///
/// Only the first `available` bytes are considered (clamped to the
/// slice). The result is always `<= available`; `None` means the record
/// is unparseable and the caller applies its own fallback.
pub fn frame_length(buffer: &[u8], available: usize) -> Option<usize> {
    let window = &buffer[..available.min(buffer.len())];
    Record::parse(window)?.encoded_len()
}

// ── Record chains ────────────────────────────────────────────────

/// Walk the chain of records in `buf`.
///
/// Yields each well-formed record with its start offset and stops after
/// a terminator, at the first unparseable record, or at the end of the
/// buffer.
pub fn records(buf: &[u8]) -> Records<'_> {
    Records { buf, pos: 0, done: false }
}

/// Iterator returned by [`records`].
#[derive(Debug, Clone)]
pub struct Records<'a> {
    buf: &'a [u8],
    pos: usize,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = (usize, Record);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let parsed = self
            .buf
            .get(self.pos..)
            .and_then(Record::parse)
            .and_then(|record| Some((record, record.encoded_len()?)));

        let Some((record, len)) = parsed else {
            self.done = true;
            return None;
        };

        let start = self.pos;
        self.pos += len;
        self.done = record.is_terminator();
        Some((start, record))
    }
}

fn read_u32_le(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

// ── Tests ────────────────────────────────────────────────────────
