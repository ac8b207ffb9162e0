//! Tests for the bucket file header
//!
//! These tests verify:
//! - Size limit enforcement before any file is created
//! - Corruption detection (magic, checksum, truncation)
//! - Format version checks
//! - Header inspection without opening an index

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};

use bincode::Options;
use bucketdb::index::{EntryLayout, IndexHeader, FORMAT_VERSION, HEADER_REGION};
use bucketdb::keys::KeyStrategy;
use bucketdb::{BucketError, ContentHashIndex, Document, HashIndex, Index, IndexConfig, Value, MAX_HASH_LIM};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Strategy whose persisted parameters do not fit in the header region
struct VerboseKey {
    note: String,
}

impl KeyStrategy for VerboseKey {
    fn name(&self) -> &str {
        "verbose"
    }

    fn key_width(&self) -> usize {
        16
    }

    fn params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("note".to_string(), self.note.clone())])
    }

    fn make_key(&self, _lookup: &Value) -> bucketdb::Result<Vec<u8>> {
        Ok(vec![0; 16])
    }

    fn make_key_value(&self, _record: &Document) -> bucketdb::Result<Option<(Vec<u8>, Option<Document>)>> {
        Ok(None)
    }
}

fn config(temp_dir: &TempDir) -> IndexConfig {
    IndexConfig::builder()
        .data_dir(temp_dir.path())
        .name("hdr")
        .hash_lim(16)
        .build()
        .unwrap()
}

fn sample_header() -> IndexHeader {
    IndexHeader {
        format_version: FORMAT_VERSION,
        crate_version: bucketdb::VERSION.to_string(),
        layout: EntryLayout::new(32, 32).unwrap(),
        hash_lim: 1024,
        allow_duplicates: true,
        strategy: "content_hash".to_string(),
        params: BTreeMap::from([("field".to_string(), "email".to_string())]),
        codec: "bincode-v1".to_string(),
    }
}

fn create_index(temp_dir: &TempDir) {
    let mut index = ContentHashIndex::new(config(temp_dir), bucketdb::keys::ContentHashKey::new("email")).unwrap();
    index.create_index().unwrap();
    index.close_index().unwrap();
}

fn overwrite(temp_dir: &TempDir, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .write(true)
        .open(temp_dir.path().join("hdr_buck"))
        .unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
}

/// Frame a header with a valid checksum without the capacity checks of `encode`
fn raw_region(header: &IndexHeader) -> Vec<u8> {
    let payload = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .serialize(header)
        .unwrap();
    let mut region = b"BKIX".to_vec();
    region.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    region.extend_from_slice(&payload);
    region.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    region.resize(HEADER_REGION as usize, 0);
    region
}

fn open_result(temp_dir: &TempDir) -> bucketdb::Result<()> {
    let mut index = ContentHashIndex::new(config(temp_dir), bucketdb::keys::ContentHashKey::new("email")).unwrap();
    index.open_index()
}

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_header_fills_region() {
    let region = sample_header().encode().unwrap();

    assert_eq!(region.len(), HEADER_REGION as usize);
    assert_eq!(&region[..4], b"BKIX");
    assert_eq!(IndexHeader::decode(&region).unwrap(), sample_header());
}

#[test]
fn test_slot_offsets() {
    let header = sample_header();

    assert_eq!(header.slot_offset(0), 500);
    assert_eq!(header.slot_offset(1), 577);
    assert_eq!(header.file_len(), 500 + 1024 * 77);
    assert_eq!(header.entry_line_format(), "<32s32sQIc");
}

#[test]
fn test_capacity_limits_on_encode() {
    let mut header = sample_header();
    header.hash_lim = MAX_HASH_LIM;
    assert!(header.encode().is_ok());
    assert_eq!(header.checked_file_len(), Some(500 + MAX_HASH_LIM * 77));

    header.hash_lim = MAX_HASH_LIM + 1;
    assert!(matches!(header.encode(), Err(BucketError::Config(_))));

    header.hash_lim = u64::MAX / 2;
    assert!(matches!(header.encode(), Err(BucketError::Config(_))));
    assert_eq!(header.checked_file_len(), None);
    assert_eq!(header.file_len(), u64::MAX);
}

#[test]
fn test_oversized_header_rejected() {
    let mut header = sample_header();
    header.params.insert("note".to_string(), "x".repeat(600));

    let result = header.encode();

    match result {
        Err(BucketError::HeaderTooLarge { size, limit }) => {
            assert!(size > limit);
            assert_eq!(limit, 500);
        }
        other => panic!("expected HeaderTooLarge, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_oversized_header_creates_no_files() {
    let temp_dir = TempDir::new().unwrap();
    let strategy = VerboseKey { note: "x".repeat(600) };
    let mut index = HashIndex::new(config(&temp_dir), strategy).unwrap();

    let result = index.create_index();

    assert!(matches!(result, Err(BucketError::HeaderTooLarge { .. })));
    assert!(!temp_dir.path().join("hdr_buck").exists());
    assert!(!temp_dir.path().join("hdr_stor").exists());
}

#[test]
fn test_header_near_limit_accepted() {
    let temp_dir = TempDir::new().unwrap();
    let strategy = VerboseKey { note: "x".repeat(300) };
    let mut index = HashIndex::new(config(&temp_dir), strategy).unwrap();

    index.create_index().unwrap();

    assert_eq!(index.header().unwrap().params["note"].len(), 300);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_bad_magic_detected() {
    let temp_dir = TempDir::new().unwrap();
    create_index(&temp_dir);
    overwrite(&temp_dir, 0, b"XXXX");

    assert!(matches!(open_result(&temp_dir), Err(BucketError::HeaderCorrupt(_))));
}

#[test]
fn test_checksum_mismatch_detected() {
    let temp_dir = TempDir::new().unwrap();
    create_index(&temp_dir);
    // Flip a byte inside the payload
    let region = fs::read(temp_dir.path().join("hdr_buck")).unwrap();
    overwrite(&temp_dir, 10, &[region[10] ^ 0xff]);

    assert!(matches!(open_result(&temp_dir), Err(BucketError::HeaderCorrupt(_))));
}

#[test]
fn test_overrunning_length_detected() {
    let temp_dir = TempDir::new().unwrap();
    create_index(&temp_dir);
    overwrite(&temp_dir, 4, &10_000u32.to_le_bytes());

    assert!(matches!(open_result(&temp_dir), Err(BucketError::HeaderCorrupt(_))));
}

#[test]
fn test_huge_hash_lim_detected() {
    let temp_dir = TempDir::new().unwrap();
    create_index(&temp_dir);
    let path = temp_dir.path().join("hdr_buck");
    let mut header = IndexHeader::read_from(&path).unwrap();
    header.hash_lim = u64::MAX / 2;
    overwrite(&temp_dir, 0, &raw_region(&header));

    assert!(matches!(IndexHeader::read_from(&path), Err(BucketError::HeaderCorrupt(_))));
    assert!(matches!(open_result(&temp_dir), Err(BucketError::HeaderCorrupt(_))));
}

#[test]
fn test_zero_hash_lim_detected() {
    let mut header = sample_header();
    header.hash_lim = 0;

    let result = IndexHeader::decode(&raw_region(&header));

    assert!(matches!(result, Err(BucketError::HeaderCorrupt(_))));
}

#[test]
fn test_truncated_file_detected() {
    let temp_dir = TempDir::new().unwrap();
    create_index(&temp_dir);
    let path = temp_dir.path().join("hdr_buck");
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(200).unwrap();

    assert!(matches!(open_result(&temp_dir), Err(BucketError::HeaderCorrupt(_))));
}

#[test]
fn test_truncated_slot_array_detected() {
    let temp_dir = TempDir::new().unwrap();
    create_index(&temp_dir);
    let path = temp_dir.path().join("hdr_buck");
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(HEADER_REGION + 10).unwrap();

    assert!(matches!(open_result(&temp_dir), Err(BucketError::HeaderCorrupt(_))));
}

#[test]
fn test_unknown_status_byte_detected() {
    let temp_dir = TempDir::new().unwrap();
    create_index(&temp_dir);
    // Last byte of slot 0 is its status
    overwrite(&temp_dir, HEADER_REGION + 76, b"?");

    let mut index = ContentHashIndex::new(config(&temp_dir), bucketdb::keys::ContentHashKey::new("email")).unwrap();
    index.open_index().unwrap();
    let result: bucketdb::Result<Vec<_>> = index.all(0, None).unwrap().collect();

    assert!(matches!(result, Err(BucketError::CorruptEntry { slot: 0, .. })));
}

// =============================================================================
// Version Tests
// =============================================================================

#[test]
fn test_future_version_rejected() {
    let mut header = sample_header();
    header.format_version = FORMAT_VERSION + 1;
    let region = header.encode().unwrap();

    let result = IndexHeader::decode(&region);

    assert!(matches!(result, Err(BucketError::UnsupportedVersion(v)) if v == FORMAT_VERSION + 1));
}

#[test]
fn test_future_version_rejected_on_open() {
    let temp_dir = TempDir::new().unwrap();
    create_index(&temp_dir);
    let path = temp_dir.path().join("hdr_buck");
    let mut header = IndexHeader::read_from(&path).unwrap();
    header.format_version = 99;
    overwrite(&temp_dir, 0, &header.encode().unwrap());

    assert!(matches!(open_result(&temp_dir), Err(BucketError::UnsupportedVersion(99))));
}

// =============================================================================
// Inspection Tests
// =============================================================================

#[test]
fn test_read_from_reports_config() {
    let temp_dir = TempDir::new().unwrap();
    create_index(&temp_dir);

    let header = IndexHeader::read_from(&temp_dir.path().join("hdr_buck")).unwrap();

    assert_eq!(header.hash_lim, 16);
    assert_eq!(header.strategy, "content_hash");
    assert_eq!(header.params.get("field").map(String::as_str), Some("email"));
    assert_eq!(header.codec, "bincode-v1");
    assert_eq!(header.crate_version, bucketdb::VERSION);
}

#[test]
fn test_read_from_missing_file() {
    let temp_dir = TempDir::new().unwrap();

    let result = IndexHeader::read_from(&temp_dir.path().join("nope_buck"));

    assert!(matches!(result, Err(BucketError::IndexNotFound(_))));
}

#[test]
fn test_header_updated_by_reindex() {
    let temp_dir = TempDir::new().unwrap();
    let mut index = ContentHashIndex::new(config(&temp_dir), bucketdb::keys::ContentHashKey::new("email")).unwrap();
    index.create_index().unwrap();

    index.reindex(128).unwrap();
    index.close_index().unwrap();

    let header = IndexHeader::read_from(&temp_dir.path().join("hdr_buck")).unwrap();
    assert_eq!(header.hash_lim, 128);
    assert_eq!(
        fs::metadata(temp_dir.path().join("hdr_buck")).unwrap().len(),
        header.file_len()
    );
}
