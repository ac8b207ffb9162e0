//! Hash Index
//!
//! Open addressing over a fixed-size slot array.
//!
//! ## Placement
//! - Home slot = `slot_hash(key) % hash_lim`
//! - Insert probes forward (wrapping) to the first empty slot, reusing the
//!   first tombstone seen on the way
//! - Lookups compare full key bytes; an empty slot ends the chain,
//!   tombstones do not
//! - A probe that covers the whole table without finding room fails with
//!   `TryReindex`; capacity only changes through a full rebuild

use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::{BincodeCodec, ValueCodec};
use crate::config::{bucket_path, IndexConfig, ReindexPolicy, MAX_HASH_LIM};
use crate::document::{DocId, Document, Value};
use crate::error::{BucketError, Result};
use crate::keys::{strategy_from_header, ContentHashKey, IdKey, KeyStrategy};
use crate::storage::{remove_if_exists, ValueStore};

use super::bucket::BucketFile;
use super::header::{IndexHeader, FORMAT_VERSION};
use super::iter::{ProbeIter, ScanIter};
use super::layout::{EntryLayout, EntryStatus, IndexEntry};
use super::{Entries, Index, IndexState};

/// Secondary index keyed by the digest of one field
pub type ContentHashIndex = HashIndex<ContentHashKey>;

/// Primary index keyed by `_id`
pub type IdIndex = HashIndex<IdKey>;

/// Index whose kind is read from its header
pub type DynHashIndex = HashIndex<Box<dyn KeyStrategy>>;

/// Slot occupancy counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub hash_lim: u64,
    pub live: u64,
    pub deleted: u64,
    pub empty: u64,
}

/// Outcome of locating an entry for mutation
enum Located {
    Found(IndexEntry),
    /// Key is live but under other doc ids
    KeyOnly,
    Missing,
}

/// Fixed-capacity on-disk hash index
pub struct HashIndex<K: KeyStrategy> {
    config: IndexConfig,
    strategy: K,
    state: IndexState,
    bucket: Option<BucketFile>,
    storage: ValueStore<Document>,
}

impl<K: KeyStrategy> HashIndex<K> {
    /// Bind an index to its files; nothing is touched until create/open
    pub fn new(config: IndexConfig, strategy: K) -> Result<Self> {
        Self::with_codec(config, strategy, Box::new(BincodeCodec::<Document>::new()))
    }

    /// Like `new`, with a non-default value codec
    pub fn with_codec(config: IndexConfig, strategy: K, codec: Box<dyn ValueCodec<Document>>) -> Result<Self> {
        config.validate()?;
        let storage = ValueStore::new(config.storage_path(), codec);
        Ok(Self {
            config,
            strategy,
            state: IndexState::Unopened,
            bucket: None,
            storage,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn strategy(&self) -> &K {
        &self.strategy
    }

    /// Persisted configuration of the opened index
    pub fn header(&self) -> Result<&IndexHeader> {
        match self.state {
            IndexState::Opened => self
                .bucket
                .as_ref()
                .map(BucketFile::header)
                .ok_or_else(|| BucketError::IndexNotOpened(self.config.name.clone())),
            IndexState::Destroyed => Err(BucketError::IndexDestroyed(self.config.name.clone())),
            _ => Err(BucketError::IndexNotOpened(self.config.name.clone())),
        }
    }

    pub fn hash_lim(&self) -> Result<u64> {
        Ok(self.header()?.hash_lim)
    }

    /// Slot a key's probe chain starts at
    pub fn home_slot(&self, key: &[u8]) -> Result<u64> {
        Ok(home_slot(&self.strategy, key, self.hash_lim()?))
    }

    /// Count live, deleted and empty slots
    pub fn stats(&mut self) -> Result<IndexStats> {
        let bucket = self.bucket_mut()?;
        let mut stats = IndexStats {
            hash_lim: bucket.hash_lim(),
            ..IndexStats::default()
        };
        for slot in 0..bucket.hash_lim() {
            match bucket.read_slot(slot)? {
                None => stats.empty += 1,
                Some(entry) if entry.status.is_live() => stats.live += 1,
                Some(_) => stats.deleted += 1,
            }
        }
        Ok(stats)
    }

    /// Rebuild the table at `new_hash_lim` slots
    ///
    /// Live entries are replayed into a fresh bucket file which then replaces
    /// the old one with a rename. Tombstones are dropped.
    pub fn reindex(&mut self, new_hash_lim: u64) -> Result<()> {
        if new_hash_lim == 0 || new_hash_lim > MAX_HASH_LIM {
            return Err(BucketError::Config(format!(
                "hash_lim must be in 1..={}, got {}",
                MAX_HASH_LIM, new_hash_lim
            )));
        }
        let live = self.live_entries()?;
        let old_hash_lim = self.hash_lim()?;
        self.rebuild(new_hash_lim, live)?;
        tracing::info!(
            index = %self.config.name,
            old_hash_lim,
            new_hash_lim,
            "reindexed"
        );
        Ok(())
    }

    /// Compact both files
    ///
    /// Payloads still referenced by live entries are copied into a fresh
    /// value store; the bucket file is rebuilt with the new regions. Every
    /// live `key -> value` pair is preserved; offsets change.
    ///
    /// Both replacement files are written and synced before either is
    /// swapped in. A failure before the swap leaves the index untouched.
    pub fn compact_storage(&mut self) -> Result<()> {
        let live = self.live_entries()?;
        let hash_lim = self.hash_lim()?;
        let store_tmp = tmp_path(self.storage.path(), "compact");
        let bucket_tmp = tmp_path(&self.config.bucket_path(), "compact");

        if let Err(e) = self.write_compacted(&store_tmp, &bucket_tmp, hash_lim, live) {
            remove_if_exists(&store_tmp)?;
            remove_if_exists(&bucket_tmp)?;
            return Err(e);
        }

        let before = self.storage.end_offset()?;
        self.swap_compacted(&store_tmp, &bucket_tmp)?;
        tracing::info!(
            index = %self.config.name,
            before,
            after = self.storage.end_offset()?,
            "compacted value store"
        );
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn bucket_mut(&mut self) -> Result<&mut BucketFile> {
        match self.state {
            IndexState::Opened => self
                .bucket
                .as_mut()
                .ok_or_else(|| BucketError::IndexNotOpened(self.config.name.clone())),
            IndexState::Destroyed => Err(BucketError::IndexDestroyed(self.config.name.clone())),
            _ => Err(BucketError::IndexNotOpened(self.config.name.clone())),
        }
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.state == IndexState::Destroyed {
            return Err(BucketError::IndexDestroyed(self.config.name.clone()));
        }
        Ok(())
    }

    fn new_header(&self) -> Result<IndexHeader> {
        let layout = EntryLayout::new(self.config.doc_id_width, self.strategy.key_width())?;
        Ok(IndexHeader {
            format_version: FORMAT_VERSION,
            crate_version: crate::VERSION.to_string(),
            layout,
            hash_lim: self.config.hash_lim,
            allow_duplicates: self.config.allow_duplicates,
            strategy: self.strategy.name().to_string(),
            params: self.strategy.params(),
            codec: self.storage.codec_id().to_string(),
        })
    }

    /// Reject a header written for a different strategy or codec
    fn check_header(&self, header: &IndexHeader) -> Result<()> {
        if header.strategy != self.strategy.name() {
            return Err(BucketError::Config(format!(
                "index {} was created with key strategy {:?}, opened with {:?}",
                self.config.name,
                header.strategy,
                self.strategy.name()
            )));
        }
        self.strategy.check_params(&header.params)?;
        if header.layout.key_width as usize != self.strategy.key_width() {
            return Err(BucketError::Config(format!(
                "index {} stores {}-byte keys, strategy produces {}",
                self.config.name,
                header.layout.key_width,
                self.strategy.key_width()
            )));
        }
        if header.codec != self.storage.codec_id() {
            return Err(BucketError::CodecMismatch {
                expected: self.storage.codec_id().to_string(),
                found: header.codec.clone(),
            });
        }
        if header.allow_duplicates != self.config.allow_duplicates
            || header.layout.doc_id_width as usize != self.config.doc_id_width
            || header.hash_lim != self.config.hash_lim
        {
            tracing::warn!(
                index = %self.config.name,
                hash_lim = header.hash_lim,
                allow_duplicates = header.allow_duplicates,
                doc_id_width = header.layout.doc_id_width,
                "config differs from header, using header values"
            );
        }
        Ok(())
    }

    fn live_entries(&mut self) -> Result<Vec<IndexEntry>> {
        let bucket = self.bucket_mut()?;
        bucket.flush()?;
        ScanIter::new(bucket, 0, None).collect()
    }

    /// Write `entries` into a new table of `hash_lim` slots and swap it in
    fn rebuild(&mut self, hash_lim: u64, entries: Vec<IndexEntry>) -> Result<()> {
        let path = self.config.bucket_path();
        let tmp = tmp_path(&path, "reindex");

        if let Err(e) = self.write_rebuilt(&tmp, hash_lim, entries) {
            remove_if_exists(&tmp)?;
            return Err(e);
        }

        // Close the old table before the rename replaces it
        self.bucket = None;
        if let Err(e) = fs::rename(&tmp, &path) {
            self.reopen_files()?;
            remove_if_exists(&tmp)?;
            return Err(e.into());
        }
        self.reopen_files()?;
        self.config.hash_lim = hash_lim;
        Ok(())
    }

    /// Write the compacted store to `store_tmp` and its table to `bucket_tmp`
    fn write_compacted(
        &mut self,
        store_tmp: &Path,
        bucket_tmp: &Path,
        hash_lim: u64,
        mut live: Vec<IndexEntry>,
    ) -> Result<()> {
        let regions: Vec<(u64, u32)> = live.iter().map(|e| (e.start, e.size)).collect();
        let relocated = self.storage.write_compacted(store_tmp, &regions)?;
        for (entry, (start, size)) in live.iter_mut().zip(relocated) {
            entry.start = start;
            entry.size = size;
        }
        self.write_rebuilt(bucket_tmp, hash_lim, live)
    }

    /// Move both compacted files into place
    ///
    /// The old store is kept aside until the new table is in place, so a
    /// failed rename restores the previous pair.
    fn swap_compacted(&mut self, store_tmp: &Path, bucket_tmp: &Path) -> Result<()> {
        let store_path = self.storage.path().to_path_buf();
        let bucket_path = self.config.bucket_path();
        let backup = tmp_path(&store_path, "old");

        remove_if_exists(&backup)?;
        self.storage.close()?;
        self.bucket = None;

        let swapped = swap_pair(&store_path, store_tmp, &backup, &bucket_path, bucket_tmp);
        let reopened = self.reopen_files();
        match (swapped, reopened) {
            (Err(e), _) => {
                remove_if_exists(store_tmp)?;
                remove_if_exists(bucket_tmp)?;
                Err(e)
            }
            (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => remove_if_exists(&backup),
        }
    }

    /// Reopen whichever of the two files is closed
    ///
    /// The index drops to `Closed` if either cannot be opened.
    fn reopen_files(&mut self) -> Result<()> {
        let reopened = self.open_files();
        if reopened.is_err() {
            self.bucket = None;
            self.state = IndexState::Closed;
            tracing::error!(index = %self.config.name, "could not reopen index files, index closed");
        }
        reopened
    }

    fn open_files(&mut self) -> Result<()> {
        if !self.storage.is_opened() {
            self.storage.open()?;
        }
        if self.bucket.is_none() {
            self.bucket = Some(BucketFile::open(&self.config.bucket_path())?);
        }
        Ok(())
    }

    /// Build a table of `hash_lim` slots holding `entries` at `tmp`
    fn write_rebuilt(&self, tmp: &Path, hash_lim: u64, entries: Vec<IndexEntry>) -> Result<()> {
        let mut header = self.header()?.clone();
        header.hash_lim = hash_lim;

        remove_if_exists(tmp)?;
        let mut rebuilt = BucketFile::create(tmp, header)?;
        let hash_lim = rebuilt.hash_lim();
        for mut entry in entries {
            let home = home_slot(&self.strategy, &entry.key, hash_lim);
            entry.slot = match find_free_slot(&mut rebuilt, home, &entry.key, true)? {
                Some(slot) => slot,
                None => {
                    return Err(BucketError::TryReindex {
                        name: self.config.name.clone(),
                        hash_lim,
                    })
                }
            };
            rebuilt.write_slot(&entry)?;
        }
        rebuilt.fsync()
    }

    fn try_insert(&mut self, doc_id: &DocId, key: &[u8], start: u64, size: u32) -> Result<()> {
        let hash_lim = self.hash_lim()?;
        let home = home_slot(&self.strategy, key, hash_lim);
        let bucket = self.bucket_mut()?;
        let header = bucket.header();
        header.layout.check_key(key)?;
        header.layout.check_doc_id(doc_id)?;
        let allow_duplicates = header.allow_duplicates;

        let slot = match find_free_slot(bucket, home, key, allow_duplicates)? {
            Some(slot) => slot,
            None => {
                return Err(BucketError::TryReindex {
                    name: self.config.name.clone(),
                    hash_lim,
                })
            }
        };

        bucket.write_slot(&IndexEntry {
            slot,
            doc_id: doc_id.clone(),
            key: key.to_vec(),
            start,
            size,
            status: EntryStatus::Original,
        })?;
        tracing::debug!(index = %self.config.name, home, slot, "inserted entry");
        Ok(())
    }

    /// Find the live entry for `key` (and `doc_id`)
    fn locate(&mut self, key: &[u8], doc_id: &DocId) -> Result<Located> {
        let hash_lim = self.hash_lim()?;
        let home = home_slot(&self.strategy, key, hash_lim);
        let bucket = self.bucket_mut()?;
        bucket.header().layout.check_key(key)?;

        let mut key_seen = false;
        for entry in ProbeIter::new(bucket, key, home, 0, None) {
            let entry = entry?;
            if entry.doc_id == *doc_id {
                return Ok(Located::Found(entry));
            }
            key_seen = true;
        }
        Ok(if key_seen { Located::KeyOnly } else { Located::Missing })
    }

    fn located_or_err(located: Located) -> Result<IndexEntry> {
        match located {
            Located::Found(entry) => Ok(entry),
            Located::KeyOnly => Err(BucketError::DocIdNotFound),
            Located::Missing => Err(BucketError::ElemNotFound),
        }
    }
}

impl DynHashIndex {
    /// Open an existing index without knowing its kind at compile time
    ///
    /// The key strategy and table settings are taken from the header.
    pub fn open_existing(data_dir: impl Into<PathBuf>, name: &str) -> Result<Self> {
        let data_dir = data_dir.into();
        let header = IndexHeader::read_from(&bucket_path(&data_dir, name))?;
        let strategy = strategy_from_header(&header)?;
        let config = IndexConfig::builder()
            .data_dir(data_dir)
            .name(name)
            .hash_lim(header.hash_lim)
            .doc_id_width(header.layout.doc_id_width as usize)
            .allow_duplicates(header.allow_duplicates)
            .build()?;

        let mut index = Self::new(config, strategy)?;
        index.open_index()?;
        Ok(index)
    }
}

impl<K: KeyStrategy> Index for HashIndex<K> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> IndexState {
        self.state
    }

    fn create_index(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if self.state == IndexState::Opened {
            return Err(BucketError::IndexExists(self.config.name.clone()));
        }

        let bucket_path = self.config.bucket_path();
        if bucket_path.exists() {
            return Err(BucketError::IndexExists(self.config.name.clone()));
        }
        if self.storage.path().exists() {
            return Err(BucketError::StorageExists(self.storage.path().to_path_buf()));
        }

        // Header size is checked before the bucket file is created
        let header = self.new_header()?;
        let bucket = BucketFile::create(&bucket_path, header)?;
        if let Err(e) = self.storage.create() {
            drop(bucket);
            remove_if_exists(&bucket_path)?;
            return Err(e);
        }

        tracing::info!(
            index = %self.config.name,
            hash_lim = self.config.hash_lim,
            format = %bucket.header().entry_line_format(),
            "created index"
        );
        self.bucket = Some(bucket);
        self.state = IndexState::Opened;
        Ok(())
    }

    fn open_index(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if self.state == IndexState::Opened {
            return Ok(());
        }

        let bucket_path = self.config.bucket_path();
        if !bucket_path.is_file() {
            return Err(BucketError::IndexNotFound(self.config.name.clone()));
        }

        let bucket = BucketFile::open(&bucket_path)?;
        self.check_header(bucket.header())?;
        self.storage.open()?;

        let header = bucket.header();
        self.config.hash_lim = header.hash_lim;
        self.config.allow_duplicates = header.allow_duplicates;
        self.config.doc_id_width = header.layout.doc_id_width as usize;

        tracing::info!(index = %self.config.name, hash_lim = header.hash_lim, "opened index");
        self.bucket = Some(bucket);
        self.state = IndexState::Opened;
        Ok(())
    }

    fn close_index(&mut self) -> Result<()> {
        self.bucket_mut()?;
        self.flush()?;
        self.fsync()?;
        self.bucket = None;
        self.storage.close()?;
        self.state = IndexState::Closed;
        tracing::info!(index = %self.config.name, "closed index");
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        if self.state == IndexState::Destroyed {
            return Ok(());
        }
        match self.bucket.take() {
            Some(mut bucket) => bucket.discard_pending(),
            None => {
                // Only delete files this index would be able to open
                let bucket_path = self.config.bucket_path();
                if bucket_path.exists() {
                    let header = IndexHeader::read_from(&bucket_path)?;
                    self.check_header(&header)?;
                }
            }
        }
        remove_if_exists(&self.config.bucket_path())?;
        self.storage.destroy()?;
        self.state = IndexState::Destroyed;
        tracing::info!(index = %self.config.name, "destroyed index");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if let Some(bucket) = self.bucket.as_mut() {
            bucket.flush()?;
        }
        self.storage.flush()
    }

    fn fsync(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if let Some(bucket) = self.bucket.as_mut() {
            bucket.fsync()?;
        }
        self.storage.fsync()
    }

    fn storage(&mut self) -> Result<&mut ValueStore<Document>> {
        self.ensure_usable()?;
        Ok(&mut self.storage)
    }

    fn insert(&mut self, doc_id: &DocId, key: &[u8], start: u64, size: u32) -> Result<()> {
        match self.try_insert(doc_id, key, start, size) {
            Err(BucketError::TryReindex { hash_lim, .. }) => match self.config.reindex_policy {
                ReindexPolicy::Grow { factor } => {
                    tracing::info!(index = %self.config.name, hash_lim, "table full, growing");
                    let grown = hash_lim.saturating_mul(factor).min(MAX_HASH_LIM);
                    if grown <= hash_lim {
                        return Err(BucketError::TryReindex {
                            name: self.config.name.clone(),
                            hash_lim,
                        });
                    }
                    self.reindex(grown)?;
                    self.try_insert(doc_id, key, start, size)
                }
                ReindexPolicy::Manual => Err(BucketError::TryReindex {
                    name: self.config.name.clone(),
                    hash_lim,
                }),
            },
            other => other,
        }
    }

    fn update(&mut self, doc_id: &DocId, key: &[u8], start: u64, size: u32) -> Result<()> {
        let mut entry = Self::located_or_err(self.locate(key, doc_id)?)?;
        entry.start = start;
        entry.size = size;
        entry.status = EntryStatus::Updated;
        self.bucket_mut()?.write_slot(&entry)
    }

    fn get(&mut self, key: &[u8]) -> Result<Option<IndexEntry>> {
        let hash_lim = self.hash_lim()?;
        let home = home_slot(&self.strategy, key, hash_lim);
        let bucket = self.bucket_mut()?;
        bucket.header().layout.check_key(key)?;
        ProbeIter::new(bucket, key, home, 0, Some(1)).next().transpose()
    }

    fn delete(&mut self, doc_id: &DocId, key: &[u8]) -> Result<()> {
        let mut entry = Self::located_or_err(self.locate(key, doc_id)?)?;
        entry.status = EntryStatus::Deleted;
        entry.start = 0;
        entry.size = 0;
        let slot = entry.slot;
        self.bucket_mut()?.write_slot(&entry)?;
        tracing::debug!(index = %self.config.name, slot, "deleted entry");
        Ok(())
    }

    fn get_many<'a>(&'a mut self, key: &[u8], start_from: usize, limit: Option<usize>) -> Result<Entries<'a>> {
        let hash_lim = self.hash_lim()?;
        let home = home_slot(&self.strategy, key, hash_lim);
        let bucket = self.bucket_mut()?;
        bucket.header().layout.check_key(key)?;
        Ok(Box::new(ProbeIter::new(bucket, key, home, start_from, limit)))
    }

    fn all<'a>(&'a mut self, start_from: usize, limit: Option<usize>) -> Result<Entries<'a>> {
        let bucket = self.bucket_mut()?;
        Ok(Box::new(ScanIter::new(bucket, start_from, limit)))
    }

    fn make_key(&self, lookup: &Value) -> Result<Vec<u8>> {
        self.strategy.make_key(lookup)
    }

    fn make_key_value(&self, record: &Document) -> Result<Option<(Vec<u8>, Option<Document>)>> {
        self.strategy.make_key_value(record)
    }

    fn compact(&mut self) -> Result<()> {
        let before = self.stats()?;
        let live = self.live_entries()?;
        self.rebuild(before.hash_lim, live)?;
        tracing::info!(
            index = %self.config.name,
            live = before.live,
            dropped = before.deleted,
            "compacted index"
        );
        Ok(())
    }
}

impl<K: KeyStrategy> Drop for HashIndex<K> {
    fn drop(&mut self) {
        if let Some(bucket) = self.bucket.as_mut() {
            if bucket.pending() > 0 {
                if let Err(e) = bucket.flush() {
                    tracing::warn!(index = %self.config.name, error = %e, "failed to flush index on drop");
                }
            }
        }
    }
}

fn home_slot<K: KeyStrategy>(strategy: &K, key: &[u8], hash_lim: u64) -> u64 {
    strategy.slot_hash(key) % hash_lim
}

/// Probe from `home` for a slot to place `key` in
///
/// Returns the first empty slot, or the first tombstone passed on the way.
/// With duplicates forbidden, a live entry for the same key is a conflict.
/// `None` means the whole table was probed without room.
fn find_free_slot(bucket: &mut BucketFile, home: u64, key: &[u8], allow_duplicates: bool) -> Result<Option<u64>> {
    let hash_lim = bucket.hash_lim();
    let mut first_tombstone = None;

    for step in 0..hash_lim {
        let slot = (home + step) % hash_lim;
        match bucket.read_slot(slot)? {
            None => return Ok(Some(first_tombstone.unwrap_or(slot))),
            Some(entry) if entry.status.is_live() => {
                if !allow_duplicates && entry.key == key {
                    return Err(BucketError::IndexConflict(format!(
                        "key already indexed by document {}",
                        entry.doc_id
                    )));
                }
            }
            Some(_) => {
                if first_tombstone.is_none() {
                    first_tombstone = Some(slot);
                }
            }
        }
    }
    Ok(first_tombstone)
}

/// Sibling path used while a file is being rebuilt
/// Rename `store_tmp` over `store` and `bucket_tmp` over `bucket`
///
/// The old store sits at `backup` until both renames succeed and is moved
/// back if either fails.
fn swap_pair(store: &Path, store_tmp: &Path, backup: &Path, bucket: &Path, bucket_tmp: &Path) -> Result<()> {
    fs::rename(store, backup)?;
    let installed = fs::rename(store_tmp, store).and_then(|()| fs::rename(bucket_tmp, bucket));
    if let Err(e) = installed {
        fs::rename(backup, store)?;
        return Err(e.into());
    }
    Ok(())
}

fn tmp_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
