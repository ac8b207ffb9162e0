//! Fixed-width index entry layout
//!
//! ```text
//! ┌──────────────────┬───────────────┬───────────┬──────────┬────────────┐
//! │ doc_id (N bytes) │ key (M bytes) │ start u64 │ size u32 │ status u8  │
//! │ zero-padded      │ exact width   │ LE        │ LE       │ 0/o/u/d    │
//! └──────────────────┴───────────────┴───────────┴──────────┴────────────┘
//! ```
//!
//! N and M are persisted in the index header; the trailing 13 bytes are fixed
//! for every build.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::document::DocId;
use crate::error::{BucketError, Result};

const START_WIDTH: usize = 8;
const SIZE_WIDTH: usize = 4;
const STATUS_WIDTH: usize = 1;

/// Bytes taken by start, size and status in every entry
pub const FIXED_FIELDS_SIZE: usize = START_WIDTH + SIZE_WIDTH + STATUS_WIDTH;

const _: () = assert!(FIXED_FIELDS_SIZE == 13);
const _: () = assert!(std::mem::size_of::<u64>() == START_WIDTH);
const _: () = assert!(std::mem::size_of::<u32>() == SIZE_WIDTH);

/// State of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Never written
    Empty,
    /// Live, as first inserted
    Original,
    /// Live, pointer replaced by an update
    Updated,
    /// Tombstone
    Deleted,
}

impl EntryStatus {
    pub fn to_byte(self) -> u8 {
        match self {
            EntryStatus::Empty => 0,
            EntryStatus::Original => b'o',
            EntryStatus::Updated => b'u',
            EntryStatus::Deleted => b'd',
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(EntryStatus::Empty),
            b'o' => Some(EntryStatus::Original),
            b'u' => Some(EntryStatus::Updated),
            b'd' => Some(EntryStatus::Deleted),
            _ => None,
        }
    }

    pub fn is_live(self) -> bool {
        matches!(self, EntryStatus::Original | EntryStatus::Updated)
    }
}

/// One decoded slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Slot the entry was read from (not persisted)
    pub slot: u64,
    pub doc_id: DocId,
    pub key: Vec<u8>,
    pub start: u64,
    pub size: u32,
    pub status: EntryStatus,
}

impl IndexEntry {
    /// Does this entry point at a stored payload?
    pub fn has_payload(&self) -> bool {
        self.size > 0
    }
}

/// Column widths of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLayout {
    pub doc_id_width: u16,
    pub key_width: u16,
}

impl EntryLayout {
    pub fn new(doc_id_width: usize, key_width: usize) -> Result<Self> {
        let doc_id_width = u16::try_from(doc_id_width)
            .map_err(|_| BucketError::Config(format!("doc_id_width {} too large", doc_id_width)))?;
        let key_width = u16::try_from(key_width)
            .map_err(|_| BucketError::Config(format!("key_width {} too large", key_width)))?;
        if doc_id_width == 0 || key_width == 0 {
            return Err(BucketError::Config("entry widths must be non-zero".into()));
        }
        Ok(Self {
            doc_id_width,
            key_width,
        })
    }

    /// Bytes per slot
    pub fn entry_size(&self) -> usize {
        self.doc_id_width as usize + self.key_width as usize + FIXED_FIELDS_SIZE
    }

    /// Struct-format rendering, e.g. `<32s32sQIc`
    pub fn entry_line_format(&self) -> String {
        format!("<{}s{}sQIc", self.doc_id_width, self.key_width)
    }

    pub fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_width as usize {
            return Err(BucketError::IndexPreconditions(format!(
                "key is {} bytes, index expects {}",
                key.len(),
                self.key_width
            )));
        }
        Ok(())
    }

    pub fn check_doc_id(&self, doc_id: &DocId) -> Result<()> {
        if doc_id.is_empty() || doc_id.len() > self.doc_id_width as usize {
            return Err(BucketError::IndexPreconditions(format!(
                "doc id is {} bytes, index allows 1..={}",
                doc_id.len(),
                self.doc_id_width
            )));
        }
        // Slot images pad with zeros, so a trailing zero would not survive a read
        if doc_id.as_bytes().last() == Some(&0) {
            return Err(BucketError::IndexPreconditions(format!(
                "doc id {:?} ends with a zero byte",
                doc_id.as_bytes()
            )));
        }
        Ok(())
    }

    /// Pack an entry into its fixed-width slot image
    pub fn encode(&self, entry: &IndexEntry) -> Result<BytesMut> {
        self.check_doc_id(&entry.doc_id)?;
        self.check_key(&entry.key)?;

        let mut buf = BytesMut::with_capacity(self.entry_size());
        buf.put_slice(entry.doc_id.as_bytes());
        buf.put_bytes(0, self.doc_id_width as usize - entry.doc_id.len());
        buf.put_slice(&entry.key);
        buf.put_u64_le(entry.start);
        buf.put_u32_le(entry.size);
        buf.put_u8(entry.status.to_byte());
        Ok(buf)
    }

    /// Unpack a slot image; empty slots decode to `None`
    pub fn decode(&self, slot: u64, mut buf: &[u8]) -> Result<Option<IndexEntry>> {
        if buf.len() != self.entry_size() {
            return Err(BucketError::CorruptEntry {
                slot,
                reason: format!("short slot: {} of {} bytes", buf.len(), self.entry_size()),
            });
        }

        let status_byte = buf[buf.len() - 1];
        let status = EntryStatus::from_byte(status_byte).ok_or_else(|| BucketError::CorruptEntry {
            slot,
            reason: format!("unknown status byte 0x{:02x}", status_byte),
        })?;
        if status == EntryStatus::Empty {
            return Ok(None);
        }

        let doc_id = DocId::from_padded(&buf[..self.doc_id_width as usize]);
        buf.advance(self.doc_id_width as usize);
        let key = buf[..self.key_width as usize].to_vec();
        buf.advance(self.key_width as usize);
        let start = buf.get_u64_le();
        let size = buf.get_u32_le();

        Ok(Some(IndexEntry {
            slot,
            doc_id,
            key,
            start,
            size,
            status,
        }))
    }
}
