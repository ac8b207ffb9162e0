//! Primary-id keys

use std::collections::BTreeMap;

use crate::document::{Document, Value, ID_FIELD};
use crate::error::{BucketError, Result};

use super::KeyStrategy;

/// Keys records by their `_id` field and stores the whole record
///
/// Meant for a unique index: the key is the id itself, zero-padded to
/// `width` bytes.
#[derive(Debug, Clone)]
pub struct IdKey {
    width: usize,
}

impl IdKey {
    pub const NAME: &'static str = "id";

    pub fn new(width: usize) -> Self {
        Self { width }
    }

    fn pad(&self, id: Vec<u8>) -> Result<Vec<u8>> {
        if id.is_empty() || id.len() > self.width {
            return Err(BucketError::IndexPreconditions(format!(
                "id is {} bytes, index allows 1..={}",
                id.len(),
                self.width
            )));
        }
        let mut key = id;
        key.resize(self.width, 0);
        Ok(key)
    }
}

impl KeyStrategy for IdKey {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn key_width(&self) -> usize {
        self.width
    }

    fn params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("width".to_string(), self.width.to_string())])
    }

    fn make_key(&self, lookup: &Value) -> Result<Vec<u8>> {
        self.pad(lookup.to_key_bytes())
    }

    fn make_key_value(&self, record: &Document) -> Result<Option<(Vec<u8>, Option<Document>)>> {
        let id = match record.get(ID_FIELD) {
            None | Some(Value::Null) => return Err(BucketError::DocIdNotFound),
            Some(id) => id,
        };
        let key = self.pad(id.to_key_bytes())?;
        Ok(Some((key, Some(record.clone()))))
    }
}
