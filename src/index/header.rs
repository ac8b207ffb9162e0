//! Bucket file header
//!
//! The first [`HEADER_REGION`] bytes of a bucket file hold the index's
//! persisted configuration:
//!
//! ```text
//! ┌──────────┬──────────────┬──────────────────┬───────────┬───────────┐
//! │ "BKIX"   │ len: u32 LE  │ bincode payload  │ crc32 LE  │ zero fill │
//! └──────────┴──────────────┴──────────────────┴───────────┴───────────┘
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::config::MAX_HASH_LIM;
use crate::error::{BucketError, Result};

use super::layout::EntryLayout;

/// Bytes reserved for the header at the start of every bucket file
pub const HEADER_REGION: u64 = 500;

/// Current bucket file format
pub const FORMAT_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"BKIX";

/// Magic (4) + payload length (4) + crc (4)
const FRAME_OVERHEAD: usize = 12;

/// Persisted index configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHeader {
    pub format_version: u32,
    /// Version of the crate that created the file
    pub crate_version: String,
    pub layout: EntryLayout,
    /// Number of slots
    pub hash_lim: u64,
    pub allow_duplicates: bool,
    /// Key strategy name
    pub strategy: String,
    /// Key strategy parameters
    pub params: BTreeMap<String, String>,
    /// Value codec id of the paired store
    pub codec: String,
}

fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

impl IndexHeader {
    /// Render the slot layout, e.g. `<32s32sQIc`
    pub fn entry_line_format(&self) -> String {
        self.layout.entry_line_format()
    }

    /// Byte offset of a slot in the bucket file
    ///
    /// Exact for every slot up to `hash_lim` of a header that passed
    /// [`encode`](Self::encode) or [`decode`](Self::decode); saturates otherwise.
    pub fn slot_offset(&self, slot: u64) -> u64 {
        slot.saturating_mul(self.layout.entry_size() as u64)
            .saturating_add(HEADER_REGION)
    }

    /// Total bucket file size for this header
    pub fn file_len(&self) -> u64 {
        self.slot_offset(self.hash_lim)
    }

    /// Total bucket file size, or `None` if it does not fit in a `u64`
    pub fn checked_file_len(&self) -> Option<u64> {
        self.hash_lim
            .checked_mul(self.layout.entry_size() as u64)?
            .checked_add(HEADER_REGION)
    }

    fn check_capacity(&self) -> std::result::Result<(), String> {
        if self.hash_lim == 0 {
            return Err("hash_lim is zero".into());
        }
        if self.hash_lim > MAX_HASH_LIM {
            return Err(format!("hash_lim {} exceeds {}", self.hash_lim, MAX_HASH_LIM));
        }
        match self.checked_file_len() {
            Some(_) => Ok(()),
            None => Err(format!("bucket size overflows for hash_lim {}", self.hash_lim)),
        }
    }

    /// Serialize into a full, zero-padded header region
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.check_capacity().map_err(BucketError::Config)?;
        let payload = bincode_options().serialize(self)?;
        let size = payload.len() + FRAME_OVERHEAD;
        if size > HEADER_REGION as usize {
            return Err(BucketError::HeaderTooLarge {
                size,
                limit: HEADER_REGION as usize,
            });
        }

        let mut region = Vec::with_capacity(HEADER_REGION as usize);
        region.extend_from_slice(MAGIC);
        region.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        region.extend_from_slice(&payload);
        region.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        region.resize(HEADER_REGION as usize, 0);
        Ok(region)
    }

    /// Parse and validate a header region
    pub fn decode(region: &[u8]) -> Result<Self> {
        if region.len() < FRAME_OVERHEAD || &region[0..4] != MAGIC {
            return Err(BucketError::HeaderCorrupt("bad magic".into()));
        }

        let len = u32::from_le_bytes([region[4], region[5], region[6], region[7]]) as usize;
        if len + FRAME_OVERHEAD > region.len() {
            return Err(BucketError::HeaderCorrupt(format!(
                "payload length {} overruns header region",
                len
            )));
        }

        let payload = &region[8..8 + len];
        let crc_bytes = &region[8 + len..12 + len];
        let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(payload) != stored_crc {
            return Err(BucketError::HeaderCorrupt("checksum mismatch".into()));
        }

        let header: IndexHeader = bincode_options()
            .deserialize(payload)
            .map_err(|e| BucketError::HeaderCorrupt(e.to_string()))?;

        if header.format_version != FORMAT_VERSION {
            return Err(BucketError::UnsupportedVersion(header.format_version));
        }
        header.check_capacity().map_err(BucketError::HeaderCorrupt)?;
        Ok(header)
    }

    /// Read the header of an existing bucket file
    pub fn read_from(path: &Path) -> Result<Self> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BucketError::IndexNotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut region = vec![0u8; HEADER_REGION as usize];
        file.read_exact(&mut region).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => BucketError::HeaderCorrupt("file shorter than header".into()),
            _ => BucketError::Io(e),
        })?;
        Self::decode(&region)
    }
}
