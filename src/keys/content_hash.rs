//! Content-hash keys: SHA-256 of one named field

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::document::{Document, Value};
use crate::error::Result;

use super::KeyStrategy;

/// Indexes records by the digest of a single field's text
///
/// Records without the field (or with a null value) are skipped. No payload
/// is stored; the index only answers "which documents have this value".
#[derive(Debug, Clone)]
pub struct ContentHashKey {
    field: String,
}

impl ContentHashKey {
    pub const NAME: &'static str = "content_hash";
    pub const WIDTH: usize = 32;

    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    fn digest(text: &str) -> Vec<u8> {
        Sha256::digest(text.as_bytes()).to_vec()
    }
}

impl KeyStrategy for ContentHashKey {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn key_width(&self) -> usize {
        Self::WIDTH
    }

    fn params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("field".to_string(), self.field.clone())])
    }

    fn make_key(&self, lookup: &Value) -> Result<Vec<u8>> {
        Ok(Self::digest(&lookup.to_key_string()))
    }

    fn make_key_value(&self, record: &Document) -> Result<Option<(Vec<u8>, Option<Document>)>> {
        match record.get(&self.field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some((Self::digest(&value.to_key_string()), None))),
        }
    }
}
