//! Storage Module
//!
//! Append-only value store. Index entries point into it by `(offset, length)`.
//!
//! ## Responsibilities
//! - Append encoded payloads and report where they landed
//! - Read a payload back given its region
//! - Separate flush (to the OS) from fsync (to media)
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Header (100 bytes)                                     │
//! │ ┌──────────────┬──────────────────────────────────────┐│
//! │ │ Version (10) │ Reserved (90)                        ││
//! │ │ "0.1.0\0..." │ "|||||" + codec id (32) + zero fill  ││
//! │ └──────────────┴──────────────────────────────────────┘│
//! ├────────────────────────────────────────────────────────┤
//! │ Payloads (unbounded, no length prefix)                 │
//! │ [payload][payload][payload] ...                        │
//! └────────────────────────────────────────────────────────┘
//! ```

mod value_store;

pub use value_store::ValueStore;
pub(crate) use value_store::remove_if_exists;

// =============================================================================
// Shared Constants
// =============================================================================

/// Total header size: version (10) + reserved (90)
pub const HEADER_SIZE: u64 = 100;

/// Width of the version string field
pub(crate) const VERSION_LEN: usize = 10;

/// Filler written at the start of the reserved region
pub(crate) const FILLER: &[u8; 5] = b"|||||";

/// Where the codec id starts inside the header
pub(crate) const CODEC_ID_OFFSET: usize = VERSION_LEN + FILLER.len();

const _: () = assert!(CODEC_ID_OFFSET + crate::codec::MAX_CODEC_ID_LEN <= HEADER_SIZE as usize);
