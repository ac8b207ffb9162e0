//! Error types for BucketDB
//!
//! Provides a unified error type for all operations. Each failure condition
//! has its own variant so callers can decide whether to recreate, reindex,
//! repair or abort.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using BucketError
pub type Result<T> = std::result::Result<T, BucketError>;

/// Unified error type for BucketDB operations
#[derive(Debug, Error)]
pub enum BucketError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Value Store Errors
    // -------------------------------------------------------------------------
    #[error("Storage already exists: {0}")]
    StorageExists(PathBuf),

    #[error("Storage doesn't exist: {0}")]
    StorageMissing(PathBuf),

    #[error("Storage is not initialized")]
    StorageNotInitialized,

    #[error("Storage codec mismatch: expected {expected}, found {found}")]
    CodecMismatch { expected: String, found: String },

    // -------------------------------------------------------------------------
    // Index Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Index already exists: {0}")]
    IndexExists(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Index is not opened: {0}")]
    IndexNotOpened(String),

    #[error("Index was destroyed: {0}")]
    IndexDestroyed(String),

    // -------------------------------------------------------------------------
    // Index Element Errors
    // -------------------------------------------------------------------------
    #[error("Index element not found")]
    ElemNotFound,

    #[error("Document id not found")]
    DocIdNotFound,

    #[error("Index conflict: {0}")]
    IndexConflict(String),

    #[error("Index preconditions violated: {0}")]
    IndexPreconditions(String),

    #[error("Operation not supported by this index kind: {0}")]
    NotSupported(&'static str),

    // -------------------------------------------------------------------------
    // Structural Errors
    // -------------------------------------------------------------------------
    /// The probe chain covered the whole table; rebuild at a larger
    /// `hash_lim` and retry.
    #[error("Index {name} is full at hash_lim={hash_lim}, reindex required")]
    TryReindex { name: String, hash_lim: u64 },

    #[error("Index header too large: {size} bytes (limit {limit})")]
    HeaderTooLarge { size: usize, limit: usize },

    #[error("Index header corrupt: {0}")]
    HeaderCorrupt(String),

    #[error("Unsupported index format version: {0}")]
    UnsupportedVersion(u32),

    #[error("Corrupt entry in slot {slot}: {reason}")]
    CorruptEntry { slot: u64, reason: String },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BucketError {
    /// True for the "table full" condition that a reindex can clear.
    pub fn is_reindex_required(&self) -> bool {
        matches!(self, BucketError::TryReindex { .. })
    }

    /// True for any of the not-found conditions.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BucketError::IndexNotFound(_)
                | BucketError::StorageMissing(_)
                | BucketError::ElemNotFound
                | BucketError::DocIdNotFound
        )
    }
}

impl From<bincode::Error> for BucketError {
    fn from(err: bincode::Error) -> Self {
        BucketError::Serialization(err.to_string())
    }
}
