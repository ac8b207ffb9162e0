//! Index Module
//!
//! The index contract and its hash-table implementation.
//!
//! ## Responsibilities
//! - Map fixed-width keys to `(offset, length)` regions of a value store
//! - Own the lifecycle of both files of an index
//! - Persist configuration in a bounded header
//!
//! ## Bucket File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header region (500 bytes)                               │
//! │   framed bincode IndexHeader, zero-padded               │
//! ├─────────────────────────────────────────────────────────┤
//! │ Slot 0       [doc_id][key][start u64][size u32][status] │
//! │ Slot 1       ...                                        │
//! │ ...                                                     │
//! │ Slot hash_lim - 1                                       │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod bucket;
mod hash;
mod header;
mod iter;
mod layout;

pub use hash::{ContentHashIndex, DynHashIndex, HashIndex, IdIndex, IndexStats};
pub use header::{IndexHeader, FORMAT_VERSION, HEADER_REGION};
pub use iter::{ProbeIter, ScanIter};
pub use layout::{EntryLayout, EntryStatus, IndexEntry, FIXED_FIELDS_SIZE};

use crate::document::{DocId, Document, Value};
use crate::error::{BucketError, Result};
use crate::storage::ValueStore;

/// Region recorded for entries that carry no payload
pub const NO_PAYLOAD: (u64, u32) = (1, 0);

/// Lazy sequence of index entries
pub type Entries<'a> = Box<dyn Iterator<Item = Result<IndexEntry>> + 'a>;

/// Lifecycle of an index instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Unopened,
    Opened,
    Closed,
    /// Terminal
    Destroyed,
}

/// Operations every index kind provides
///
/// Kinds that cannot answer a query leave the defaulted methods in place,
/// which report `NotSupported`.
pub trait Index {
    fn name(&self) -> &str;

    fn state(&self) -> IndexState;

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Allocate the bucket file, header and value store
    fn create_index(&mut self) -> Result<()>;

    /// Read the header of an existing index and open both files
    fn open_index(&mut self) -> Result<()>;

    /// Flush, fsync and close both files
    fn close_index(&mut self) -> Result<()>;

    /// Close and delete both files; missing files are not an error
    fn destroy(&mut self) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn fsync(&mut self) -> Result<()>;

    /// The paired value store
    fn storage(&mut self) -> Result<&mut ValueStore<Document>>;

    // -------------------------------------------------------------------------
    // Entries
    // -------------------------------------------------------------------------

    fn insert(&mut self, doc_id: &DocId, key: &[u8], start: u64, size: u32) -> Result<()>;

    fn update(&mut self, doc_id: &DocId, key: &[u8], start: u64, size: u32) -> Result<()>;

    /// First live entry for `key`
    fn get(&mut self, key: &[u8]) -> Result<Option<IndexEntry>>;

    /// Tombstone the entry of `doc_id` under `key`
    fn delete(&mut self, doc_id: &DocId, key: &[u8]) -> Result<()>;

    /// Live entries for `key`, skipping `start_from` matches
    fn get_many<'a>(
        &'a mut self,
        _key: &[u8],
        _start_from: usize,
        _limit: Option<usize>,
    ) -> Result<Entries<'a>> {
        Err(BucketError::NotSupported("get_many"))
    }

    /// Every live entry, skipping the first `start_from`
    fn all<'a>(&'a mut self, _start_from: usize, _limit: Option<usize>) -> Result<Entries<'a>> {
        Err(BucketError::NotSupported("all"))
    }

    fn make_key(&self, _lookup: &Value) -> Result<Vec<u8>> {
        Err(BucketError::NotSupported("make_key"))
    }

    fn make_key_value(&self, _record: &Document) -> Result<Option<(Vec<u8>, Option<Document>)>> {
        Err(BucketError::NotSupported("make_key_value"))
    }

    /// Drop tombstones, keeping every live mapping unchanged
    fn compact(&mut self) -> Result<()> {
        Err(BucketError::NotSupported("compact"))
    }

    // -------------------------------------------------------------------------
    // Shared Behavior
    // -------------------------------------------------------------------------

    /// Persist `value` (if any) and insert an entry pointing at it
    fn insert_with_storage(&mut self, doc_id: &DocId, key: &[u8], value: Option<&Document>) -> Result<()> {
        let (start, size) = store_value(self.storage()?, value)?;
        self.insert(doc_id, key, start, size)
    }

    /// Persist `value` (if any) and repoint the entry at it
    fn update_with_storage(&mut self, doc_id: &DocId, key: &[u8], value: Option<&Document>) -> Result<()> {
        let (start, size) = store_value(self.storage()?, value)?;
        self.update(doc_id, key, start, size)
    }

    /// Lookup plus payload read
    fn get_with_storage(&mut self, key: &[u8]) -> Result<Option<(IndexEntry, Option<Document>)>> {
        let entry = match self.get(key)? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let value = self.storage()?.get(entry.start, entry.size, Some(entry.status))?;
        Ok(Some((entry, value)))
    }

    /// Derive key and value from a record and index it
    ///
    /// Returns `false` when the key strategy skips the record.
    fn index_record(&mut self, doc_id: &DocId, record: &Document) -> Result<bool> {
        match self.make_key_value(record)? {
            Some((key, value)) => {
                self.insert_with_storage(doc_id, &key, value.as_ref())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Append a value, or hand back the no-payload region for an empty one
fn store_value(storage: &mut ValueStore<Document>, value: Option<&Document>) -> Result<(u64, u32)> {
    match value {
        Some(doc) if !doc.is_empty() => storage.insert(doc),
        _ => Ok(NO_PAYLOAD),
    }
}
