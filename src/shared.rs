//! Shared Index
//!
//! The core index is single-threaded: every call does blocking file I/O on
//! handles it owns exclusively. `SharedIndex` serializes callers behind one
//! mutex so an index can be used from several threads.
//!
//! ## Concurrency
//! - One caller at a time, reads included (a lookup moves the file cursor)
//! - Iterators are drained under the lock and returned as vectors
//! - Reindex and compaction hold the lock for their whole run

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::document::{DocId, Document};
use crate::error::Result;
use crate::index::{Index, IndexEntry};

/// Cloneable, thread-safe handle to an index
pub struct SharedIndex<I> {
    inner: Arc<Mutex<I>>,
}

impl<I> Clone for SharedIndex<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: Index> SharedIndex<I> {
    pub fn new(index: I) -> Self {
        Self {
            inner: Arc::new(Mutex::new(index)),
        }
    }

    /// Exclusive access for operations not wrapped here
    pub fn lock(&self) -> MutexGuard<'_, I> {
        self.inner.lock()
    }

    pub fn insert_with_storage(&self, doc_id: &DocId, key: &[u8], value: Option<&Document>) -> Result<()> {
        self.inner.lock().insert_with_storage(doc_id, key, value)
    }

    pub fn update_with_storage(&self, doc_id: &DocId, key: &[u8], value: Option<&Document>) -> Result<()> {
        self.inner.lock().update_with_storage(doc_id, key, value)
    }

    pub fn index_record(&self, doc_id: &DocId, record: &Document) -> Result<bool> {
        self.inner.lock().index_record(doc_id, record)
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<IndexEntry>> {
        self.inner.lock().get(key)
    }

    pub fn get_with_storage(&self, key: &[u8]) -> Result<Option<(IndexEntry, Option<Document>)>> {
        self.inner.lock().get_with_storage(key)
    }

    pub fn get_many(&self, key: &[u8], start_from: usize, limit: Option<usize>) -> Result<Vec<IndexEntry>> {
        let mut index = self.inner.lock();
        let entries = index.get_many(key, start_from, limit)?;
        entries.collect()
    }

    pub fn all(&self, start_from: usize, limit: Option<usize>) -> Result<Vec<IndexEntry>> {
        let mut index = self.inner.lock();
        let entries = index.all(start_from, limit)?;
        entries.collect()
    }

    pub fn delete(&self, doc_id: &DocId, key: &[u8]) -> Result<()> {
        self.inner.lock().delete(doc_id, key)
    }

    pub fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }

    pub fn fsync(&self) -> Result<()> {
        self.inner.lock().fsync()
    }

    pub fn compact(&self) -> Result<()> {
        self.inner.lock().compact()
    }

    pub fn close_index(&self) -> Result<()> {
        self.inner.lock().close_index()
    }
}
