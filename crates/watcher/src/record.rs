//! Offset-chained raw change records
//!
//! A batch is one flat byte region holding variable-size records. Each record
//! starts with three little-endian `u32` fields followed by the name:
//!
//! ```text
//! +0   next_entry_offset   bytes from this record to the next, 0 = last
//! +4   action              see `Action`
//! +8   file_name_length    name length in bytes (UTF-16 code units * 2)
//! +12  file_name           UTF-16LE, not NUL-terminated
//! ```
//!
//! Records are laid out on 4-byte boundaries. This is the layout the Windows
//! change journal hands back; the portable backend encodes into it too.

use crate::event::{Action, ChangeRecord};
use std::fmt;
use thiserror::Error;

/// Size of the fixed record header
pub const HEADER_LEN: usize = 12;

/// Record alignment inside a batch
pub const RECORD_ALIGN: usize = 4;

/// One delivery of raw change records from a change source
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawChangeBatch {
    bytes: Vec<u8>,
}

impl RawChangeBatch {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for RawChangeBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawChangeBatch")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Why a record could not be read at a given offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Fewer than `HEADER_LEN` bytes remain
    #[error("record header truncated")]
    TruncatedHeader,

    /// The name runs past the end of the batch
    #[error("file name of {name_len} bytes runs past end of batch")]
    TruncatedName { name_len: usize },

    /// The next offset points past the batch
    #[error("next entry offset {next} points past end of batch")]
    NextOutOfBounds { next: usize },
}

/// A borrowed view of one record inside a batch
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    offset: usize,
    next_entry_offset: u32,
    action: u32,
    name: &'a [u8],
}

impl<'a> RawRecord<'a> {
    /// Read the record starting at `offset`, checking every bound first
    pub fn parse(bytes: &'a [u8], offset: usize) -> Result<Self, LayoutError> {
        let header_end = offset
            .checked_add(HEADER_LEN)
            .filter(|end| *end <= bytes.len())
            .ok_or(LayoutError::TruncatedHeader)?;

        let next_entry_offset = read_u32(bytes, offset);
        let action = read_u32(bytes, offset + 4);
        let name_len = read_u32(bytes, offset + 8) as usize;

        let name_end = header_end
            .checked_add(name_len)
            .filter(|end| *end <= bytes.len())
            .ok_or(LayoutError::TruncatedName { name_len })?;

        if next_entry_offset != 0 {
            let next = next_entry_offset as usize;
            // The next record must at least start inside the batch
            let in_bounds = offset
                .checked_add(next)
                .map(|start| start < bytes.len())
                .unwrap_or(false);
            if !in_bounds {
                return Err(LayoutError::NextOutOfBounds { next });
            }
        }

        Ok(Self {
            offset,
            next_entry_offset,
            action,
            name: &bytes[header_end..name_end],
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn action(&self) -> Action {
        Action::from_code(self.action)
    }

    /// Absolute offset of the following record, `None` for the last record
    pub fn next_offset(&self) -> Option<usize> {
        match self.next_entry_offset {
            0 => None,
            n => Some(self.offset + n as usize),
        }
    }

    /// Name bytes converted from UTF-16LE
    ///
    /// The stored length is in bytes; a trailing odd byte is dropped.
    pub fn name(&self) -> String {
        let units: Vec<u16> = self
            .name
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    }

    pub fn to_change_record(&self) -> ChangeRecord {
        ChangeRecord {
            action: self.action(),
            name: self.name(),
        }
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Encodes change records into the chained layout
#[derive(Debug, Default)]
pub struct BatchBuilder {
    bytes: Vec<u8>,
    last_record: Option<usize>,
    count: usize,
}

impl BatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with room for roughly `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Number of bytes the record for `name` will take, padding included
    pub fn encoded_len(name: &str) -> usize {
        let raw = HEADER_LEN + name.encode_utf16().count() * 2;
        (raw + RECORD_ALIGN - 1) / RECORD_ALIGN * RECORD_ALIGN
    }

    /// Append a record and link the previous one to it
    pub fn push(&mut self, action: Action, name: &str) -> &mut Self {
        let start = self.bytes.len();

        if let Some(previous) = self.last_record {
            let delta = (start - previous) as u32;
            self.bytes[previous..previous + 4].copy_from_slice(&delta.to_le_bytes());
        }

        let name_bytes: Vec<u8> = name.encode_utf16().flat_map(u16::to_le_bytes).collect();

        self.bytes.extend_from_slice(&0u32.to_le_bytes());
        self.bytes.extend_from_slice(&action.code().to_le_bytes());
        self.bytes
            .extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(&name_bytes);
        while self.bytes.len() % RECORD_ALIGN != 0 {
            self.bytes.push(0);
        }

        self.last_record = Some(start);
        self.count += 1;
        self
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn record_count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn finish(self) -> RawChangeBatch {
        RawChangeBatch::from_bytes(self.bytes)
    }
}
