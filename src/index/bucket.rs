//! Bucket file
//!
//! Header region plus a pre-allocated array of `hash_lim` fixed-width slots.
//! Slot writes are buffered in memory until `flush`, and reads see the
//! buffered image first.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{BucketError, Result};
use crate::storage::remove_if_exists;

use super::header::IndexHeader;
use super::layout::IndexEntry;

pub(crate) struct BucketFile {
    file: File,
    header: IndexHeader,
    /// Slot images written since the last flush
    dirty: BTreeMap<u64, Vec<u8>>,
}

impl BucketFile {
    /// Create a new bucket file with an all-empty slot array
    pub(crate) fn create(path: &Path, header: IndexHeader) -> Result<Self> {
        let region = header.encode()?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        if let Err(e) = init_file(&mut file, &region, header.file_len()) {
            // A partial file would block the next create
            drop(file);
            remove_if_exists(path)?;
            return Err(e);
        }

        Ok(Self {
            file,
            header,
            dirty: BTreeMap::new(),
        })
    }

    /// Open an existing bucket file and validate its header
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let header = IndexHeader::read_from(path)?;
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let len = file.metadata()?.len();
        if len < header.file_len() {
            return Err(BucketError::HeaderCorrupt(format!(
                "bucket file is {} bytes, header describes {}",
                len,
                header.file_len()
            )));
        }

        Ok(Self {
            file,
            header,
            dirty: BTreeMap::new(),
        })
    }

    pub(crate) fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub(crate) fn hash_lim(&self) -> u64 {
        self.header.hash_lim
    }

    /// Decode one slot; `None` for an empty slot
    pub(crate) fn read_slot(&mut self, slot: u64) -> Result<Option<IndexEntry>> {
        debug_assert!(slot < self.header.hash_lim);
        let layout = self.header.layout;

        if let Some(image) = self.dirty.get(&slot) {
            return layout.decode(slot, image);
        }

        let mut image = vec![0u8; layout.entry_size()];
        self.file.seek(SeekFrom::Start(self.header.slot_offset(slot)))?;
        self.file.read_exact(&mut image)?;
        layout.decode(slot, &image)
    }

    /// Buffer a slot image at `entry.slot`
    pub(crate) fn write_slot(&mut self, entry: &IndexEntry) -> Result<()> {
        if entry.slot >= self.header.hash_lim {
            return Err(BucketError::CorruptEntry {
                slot: entry.slot,
                reason: format!("slot outside table of {}", self.header.hash_lim),
            });
        }
        let image = self.header.layout.encode(entry)?;
        self.dirty.insert(entry.slot, image.to_vec());
        Ok(())
    }

    /// Number of slot writes not yet pushed to the OS
    pub(crate) fn pending(&self) -> usize {
        self.dirty.len()
    }

    /// Write buffered slots to the OS
    pub(crate) fn flush(&mut self) -> Result<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        for (slot, image) in &self.dirty {
            self.file.seek(SeekFrom::Start(self.header.slot_offset(*slot)))?;
            self.file.write_all(image)?;
        }
        self.file.flush()?;
        self.dirty.clear();
        Ok(())
    }

    /// Flush, then force the OS to persist the file
    pub(crate) fn fsync(&mut self) -> Result<()> {
        self.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Drop buffered slot writes
    pub(crate) fn discard_pending(&mut self) {
        self.dirty.clear();
    }
}

/// Write the header region and size the slot array
fn init_file(file: &mut File, region: &[u8], len: u64) -> Result<()> {
    file.write_all(region)?;
    // Zero-filled slots read back as empty
    file.set_len(len)?;
    file.flush()?;
    Ok(())
}
