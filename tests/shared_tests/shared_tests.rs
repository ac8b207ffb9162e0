//! Tests for SharedIndex
//!
//! These tests verify:
//! - Concurrent writers through cloned handles
//! - Readers running alongside writers
//! - Collected iteration and maintenance under the lock

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use bucketdb::keys::IdKey;
use bucketdb::{DocId, Document, IdIndex, Index, IndexConfig, ReindexPolicy, SharedIndex, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn shared_index(temp_dir: &TempDir, hash_lim: u64) -> SharedIndex<IdIndex> {
    let config = IndexConfig::builder()
        .data_dir(temp_dir.path())
        .name("shared")
        .hash_lim(hash_lim)
        .allow_duplicates(false)
        .reindex_policy(ReindexPolicy::Grow { factor: 2 })
        .build()
        .unwrap();
    let mut index = IdIndex::new(config, IdKey::new(16)).unwrap();
    index.create_index().unwrap();
    SharedIndex::new(index)
}

fn record(id: &str, n: i64) -> Document {
    let mut doc = BTreeMap::new();
    doc.insert("_id".to_string(), Value::from(id));
    doc.insert("n".to_string(), Value::Int(n));
    doc
}

fn key_for(index: &SharedIndex<IdIndex>, id: &str) -> Vec<u8> {
    index.lock().make_key(&Value::from(id)).unwrap()
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers() {
    let temp_dir = TempDir::new().unwrap();
    let index = shared_index(&temp_dir, 1024);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let index = index.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let id = format!("t{}-{}", t, i);
                    index.index_record(&DocId::from(id.as_str()), &record(&id, i)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(index.all(0, None).unwrap().len(), 200);
    for t in 0..4 {
        let id = format!("t{}-49", t);
        let (_, value) = index.get_with_storage(&key_for(&index, &id)).unwrap().unwrap();
        assert_eq!(value, Some(record(&id, 49)));
    }
}

#[test]
fn test_concurrent_writers_trigger_growth() {
    let temp_dir = TempDir::new().unwrap();
    let index = shared_index(&temp_dir, 8);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let index = index.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    let id = format!("g{}-{}", t, i);
                    index.index_record(&DocId::from(id.as_str()), &record(&id, i)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(index.lock().hash_lim().unwrap() >= 128);
    assert_eq!(index.all(0, None).unwrap().len(), 100);
}

#[test]
fn test_readers_alongside_writer() {
    let temp_dir = TempDir::new().unwrap();
    let index = shared_index(&temp_dir, 512);
    index.index_record(&DocId::from("seed"), &record("seed", 0)).unwrap();
    let seed_key = Arc::new(key_for(&index, "seed"));

    let writer = {
        let index = index.clone();
        thread::spawn(move || {
            for i in 0..100 {
                let id = format!("w{}", i);
                index.index_record(&DocId::from(id.as_str()), &record(&id, i)).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let index = index.clone();
            let seed_key = Arc::clone(&seed_key);
            thread::spawn(move || {
                for _ in 0..100 {
                    let entry = index.get(&seed_key).unwrap().unwrap();
                    assert_eq!(entry.doc_id, DocId::from("seed"));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(index.all(0, None).unwrap().len(), 101);
}

// =============================================================================
// Wrapped Operation Tests
// =============================================================================

#[test]
fn test_update_delete_and_compact() {
    let temp_dir = TempDir::new().unwrap();
    let index = shared_index(&temp_dir, 64);
    for i in 0..6 {
        let id = i.to_string();
        index.index_record(&DocId::from(id.as_str()), &record(&id, i)).unwrap();
    }

    let key1 = key_for(&index, "1");
    index
        .update_with_storage(&DocId::from("1"), &key1, Some(&record("1", 100)))
        .unwrap();
    let key2 = key_for(&index, "2");
    index.delete(&DocId::from("2"), &key2).unwrap();
    index.compact().unwrap();
    index.flush().unwrap();
    index.fsync().unwrap();

    assert_eq!(index.get_with_storage(&key1).unwrap().unwrap().1, Some(record("1", 100)));
    assert!(index.get(&key2).unwrap().is_none());
    assert_eq!(index.get_many(&key1, 0, None).unwrap().len(), 1);
    assert_eq!(index.all(2, Some(2)).unwrap().len(), 2);
    assert_eq!(index.lock().stats().unwrap().deleted, 0);

    index.close_index().unwrap();
}

#[test]
fn test_insert_with_storage_through_handle() {
    let temp_dir = TempDir::new().unwrap();
    let index = shared_index(&temp_dir, 64);
    let key = key_for(&index, "x");

    index
        .insert_with_storage(&DocId::from("x"), &key, Some(&record("x", 1)))
        .unwrap();

    let (entry, value) = index.get_with_storage(&key).unwrap().unwrap();
    assert_eq!(entry.doc_id, DocId::from("x"));
    assert_eq!(value, Some(record("x", 1)));
}
