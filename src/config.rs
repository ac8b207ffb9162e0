//! Configuration for BucketDB indexes
//!
//! Centralized configuration with sensible defaults. The persisted part of an
//! index's configuration lives in its header (see [`crate::index::IndexHeader`]);
//! this struct is what callers hand in at create/open time.

use std::path::{Path, PathBuf};

use crate::error::{BucketError, Result};

/// Largest slot count an index may be created with or grown to
pub const MAX_HASH_LIM: u64 = 1 << 32;

/// Configuration for a single index and its value store
#[derive(Debug, Clone)]
pub struct IndexConfig {
    // -------------------------------------------------------------------------
    // Location
    // -------------------------------------------------------------------------
    /// Directory holding the index files:
    ///   {data_dir}/
    ///     ├── {name}_buck     (header + slot array)
    ///     └── {name}_stor     (append-only value store)
    pub data_dir: PathBuf,

    /// Index name, used to derive file names
    pub name: String,

    // -------------------------------------------------------------------------
    // Table Configuration
    // -------------------------------------------------------------------------
    /// Number of slots in the hash table (fixed at creation)
    pub hash_lim: u64,

    /// Byte width of the doc id column in each entry
    pub doc_id_width: usize,

    /// Whether one key may map to several live entries
    pub allow_duplicates: bool,

    /// What to do when the table cannot place a new entry
    pub reindex_policy: ReindexPolicy,
}

/// Reaction to a full probe chain on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexPolicy {
    /// Surface `TryReindex` to the caller
    Manual,

    /// Rebuild at `hash_lim * factor` and retry the insert once
    Grow { factor: u64 },
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./bucketdb_data"),
            name: "main".to_string(),
            hash_lim: 4 * 1024,
            doc_id_width: 32,
            allow_duplicates: true,
            reindex_policy: ReindexPolicy::Manual,
        }
    }
}

impl IndexConfig {
    /// Create a new config builder
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::default()
    }

    /// Path of the bucket file (`<name>_buck`)
    pub fn bucket_path(&self) -> PathBuf {
        bucket_path(&self.data_dir, &self.name)
    }

    /// Path of the value store file (`<name>_stor`)
    pub fn storage_path(&self) -> PathBuf {
        storage_path(&self.data_dir, &self.name)
    }

    /// Check field ranges
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(BucketError::Config("index name must not be empty".into()));
        }
        if self.hash_lim == 0 {
            return Err(BucketError::Config("hash_lim must be greater than zero".into()));
        }
        if self.hash_lim > MAX_HASH_LIM {
            return Err(BucketError::Config(format!(
                "hash_lim must be at most {}, got {}",
                MAX_HASH_LIM, self.hash_lim
            )));
        }
        if self.doc_id_width == 0 || self.doc_id_width > u8::MAX as usize {
            return Err(BucketError::Config(format!(
                "doc_id_width must be in 1..=255, got {}",
                self.doc_id_width
            )));
        }
        if let ReindexPolicy::Grow { factor } = self.reindex_policy {
            if factor < 2 {
                return Err(BucketError::Config(format!(
                    "reindex growth factor must be at least 2, got {}",
                    factor
                )));
            }
        }
        Ok(())
    }
}

/// Bucket file path for an index name
pub fn bucket_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}_buck", name))
}

/// Value store path for an index name
pub fn storage_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}_stor", name))
}

/// Builder for IndexConfig
#[derive(Default)]
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the index name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the table capacity
    pub fn hash_lim(mut self, hash_lim: u64) -> Self {
        self.config.hash_lim = hash_lim;
        self
    }

    /// Set the doc id width (in bytes)
    pub fn doc_id_width(mut self, width: usize) -> Self {
        self.config.doc_id_width = width;
        self
    }

    /// Allow or forbid duplicate live keys
    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.config.allow_duplicates = allow;
        self
    }

    /// Set the reindex policy
    pub fn reindex_policy(mut self, policy: ReindexPolicy) -> Self {
        self.config.reindex_policy = policy;
        self
    }

    pub fn build(self) -> Result<IndexConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
