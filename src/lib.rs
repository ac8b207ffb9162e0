//! # BucketDB
//!
//! An embedded, schema-less key-value storage engine with:
//! - An append-only value store addressed by `(offset, length)`
//! - Fixed-capacity on-disk hash indexes with linear probing
//! - Explicit flush/fsync durability control
//! - Reindex on table exhaustion and tombstone compaction
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application record                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ make_key_value
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Key Strategy                             │
//! │            (content hash, primary id, ...)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ (key, value)
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌──────────────┐ offset,len ┌──────────────┐
//!   │ Value Store  │◄───────────│  Hash Index  │
//!   │ <name>_stor  │            │ <name>_buck  │
//!   └──────────────┘            └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod document;
pub mod storage;
pub mod index;
pub mod keys;
pub mod shared;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{IndexConfig, ReindexPolicy, MAX_HASH_LIM};
pub use document::{DocId, Document, Value};
pub use error::{BucketError, Result};
pub use index::{ContentHashIndex, HashIndex, IdIndex, Index, IndexEntry};
pub use shared::SharedIndex;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of BucketDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
