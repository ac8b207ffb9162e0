//! Tests for key strategies
//!
//! These tests verify:
//! - Content-hash key derivation and record skipping
//! - Id key padding and precondition errors
//! - Parameter checks against persisted headers
//! - Rebuilding a strategy from a header

use std::collections::BTreeMap;

use bucketdb::index::{EntryLayout, IndexHeader, FORMAT_VERSION};
use bucketdb::keys::{strategy_from_header, ContentHashKey, IdKey, KeyStrategy};
use bucketdb::{BucketError, Document, Value};
use sha2::{Digest, Sha256};

// =============================================================================
// Helper Functions
// =============================================================================

fn doc(fields: &[(&str, Value)]) -> Document {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn header(strategy: &str, params: &[(&str, &str)], key_width: usize) -> IndexHeader {
    IndexHeader {
        format_version: FORMAT_VERSION,
        crate_version: bucketdb::VERSION.to_string(),
        layout: EntryLayout::new(32, key_width).unwrap(),
        hash_lim: 64,
        allow_duplicates: true,
        strategy: strategy.to_string(),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        codec: "bincode-v1".to_string(),
    }
}

// =============================================================================
// Content Hash Tests
// =============================================================================

#[test]
fn test_content_hash_key_is_sha256_of_text() {
    let strategy = ContentHashKey::new("email");

    let key = strategy.make_key(&Value::from("a@example.com")).unwrap();

    assert_eq!(key.len(), ContentHashKey::WIDTH);
    assert_eq!(key, Sha256::digest(b"a@example.com").to_vec());
}

#[test]
fn test_content_hash_record_and_lookup_agree() {
    let strategy = ContentHashKey::new("age");
    let record = doc(&[("age", Value::Int(42)), ("name", Value::from("x"))]);

    let (key, value) = strategy.make_key_value(&record).unwrap().unwrap();

    assert_eq!(key, strategy.make_key(&Value::Int(42)).unwrap());
    assert_eq!(key, Sha256::digest(b"42").to_vec());
    assert!(value.is_none());
}

#[test]
fn test_content_hash_skips_missing_or_null_field() {
    let strategy = ContentHashKey::new("email");

    assert!(strategy.make_key_value(&doc(&[("name", Value::from("x"))])).unwrap().is_none());
    assert!(strategy.make_key_value(&doc(&[("email", Value::Null)])).unwrap().is_none());
}

#[test]
fn test_content_hash_distinguishes_values() {
    let strategy = ContentHashKey::new("v");

    let a = strategy.make_key(&Value::from("1")).unwrap();
    let b = strategy.make_key(&Value::from("2")).unwrap();
    let list = strategy.make_key(&Value::List(vec![Value::Int(1), Value::Bool(true)])).unwrap();

    assert_ne!(a, b);
    assert_eq!(list, Sha256::digest(b"[1, True]").to_vec());
}

#[test]
fn test_content_hash_params() {
    let strategy = ContentHashKey::new("email");

    assert_eq!(strategy.name(), "content_hash");
    assert_eq!(strategy.field(), "email");
    assert_eq!(
        strategy.params(),
        BTreeMap::from([("field".to_string(), "email".to_string())])
    );
}

// =============================================================================
// Id Key Tests
// =============================================================================

#[test]
fn test_id_key_pads_to_width() {
    let strategy = IdKey::new(8);

    let key = strategy.make_key(&Value::from("abc")).unwrap();

    assert_eq!(key, b"abc\0\0\0\0\0".to_vec());
    assert_eq!(strategy.key_width(), 8);
}

#[test]
fn test_id_key_stores_whole_record() {
    let strategy = IdKey::new(8);
    let record = doc(&[("_id", Value::from("42")), ("name", Value::from("alice"))]);

    let (key, value) = strategy.make_key_value(&record).unwrap().unwrap();

    assert_eq!(key, strategy.make_key(&Value::from("42")).unwrap());
    assert_eq!(value, Some(record));
}

#[test]
fn test_id_key_numeric_and_bytes_ids() {
    let strategy = IdKey::new(4);

    assert_eq!(strategy.make_key(&Value::Int(7)).unwrap(), b"7\0\0\0".to_vec());
    assert_eq!(
        strategy.make_key(&Value::Bytes(vec![1, 2, 3, 4])).unwrap(),
        vec![1, 2, 3, 4]
    );
}

#[test]
fn test_id_key_rejects_bad_ids() {
    let strategy = IdKey::new(4);

    assert!(matches!(
        strategy.make_key(&Value::from("too long")),
        Err(BucketError::IndexPreconditions(_))
    ));
    assert!(matches!(
        strategy.make_key(&Value::from("")),
        Err(BucketError::IndexPreconditions(_))
    ));
}

#[test]
fn test_id_key_requires_id_field() {
    let strategy = IdKey::new(8);

    let missing = strategy.make_key_value(&doc(&[("name", Value::from("x"))]));
    let null = strategy.make_key_value(&doc(&[("_id", Value::Null)]));

    assert!(matches!(missing, Err(BucketError::DocIdNotFound)));
    assert!(matches!(null, Err(BucketError::DocIdNotFound)));
}

// =============================================================================
// Parameter Check Tests
// =============================================================================

#[test]
fn test_check_params_accepts_own() {
    let strategy = IdKey::new(16);

    strategy.check_params(&strategy.params()).unwrap();
}

#[test]
fn test_check_params_rejects_mismatch() {
    let strategy = IdKey::new(16);
    let stored = BTreeMap::from([("width".to_string(), "8".to_string())]);

    assert!(matches!(strategy.check_params(&stored), Err(BucketError::Config(_))));
}

#[test]
fn test_check_params_rejects_missing_and_unknown() {
    let strategy = ContentHashKey::new("email");
    let missing = BTreeMap::new();
    let unknown = BTreeMap::from([
        ("field".to_string(), "email".to_string()),
        ("salt".to_string(), "x".to_string()),
    ]);

    assert!(matches!(strategy.check_params(&missing), Err(BucketError::Config(_))));
    assert!(matches!(strategy.check_params(&unknown), Err(BucketError::Config(_))));
}

#[test]
fn test_default_slot_hash_is_crc32() {
    let strategy = ContentHashKey::new("email");
    let key = strategy.make_key(&Value::from("a")).unwrap();

    assert_eq!(strategy.slot_hash(&key), crc32fast::hash(&key) as u64);
}

// =============================================================================
// Header Reconstruction Tests
// =============================================================================

#[test]
fn test_strategy_from_content_hash_header() {
    let header = header("content_hash", &[("field", "email")], 32);

    let strategy = strategy_from_header(&header).unwrap();

    assert_eq!(strategy.name(), "content_hash");
    assert_eq!(strategy.key_width(), 32);
    assert_eq!(
        strategy.make_key(&Value::from("x")).unwrap(),
        ContentHashKey::new("email").make_key(&Value::from("x")).unwrap()
    );
}

#[test]
fn test_strategy_from_id_header() {
    let header = header("id", &[("width", "12")], 12);

    let strategy = strategy_from_header(&header).unwrap();

    assert_eq!(strategy.name(), "id");
    assert_eq!(strategy.key_width(), 12);
}

#[test]
fn test_strategy_from_header_errors() {
    let unknown = header("bloom", &[], 32);
    let missing = header("content_hash", &[], 32);
    let bad_width = header("id", &[("width", "wide")], 32);

    assert!(matches!(strategy_from_header(&unknown), Err(BucketError::Config(_))));
    assert!(matches!(strategy_from_header(&missing), Err(BucketError::Config(_))));
    assert!(matches!(strategy_from_header(&bad_width), Err(BucketError::Config(_))));
}
