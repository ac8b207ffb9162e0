//! Key Strategies
//!
//! Each index kind decides how a record turns into a fixed-width key (and an
//! optional value to store alongside it), and where that key's probe chain
//! starts.

mod content_hash;
mod id;

use std::collections::BTreeMap;

pub use content_hash::ContentHashKey;
pub use id::IdKey;

use crate::document::{Document, Value};
use crate::error::{BucketError, Result};
use crate::index::IndexHeader;

/// Key derivation for one index kind
pub trait KeyStrategy: Send {
    /// Name persisted in the index header
    fn name(&self) -> &str;

    /// Byte width of every key this strategy produces
    fn key_width(&self) -> usize;

    /// Strategy parameters persisted in the index header
    fn params(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Reject stored parameters that differ from this strategy's own
    fn check_params(&self, stored: &BTreeMap<String, String>) -> Result<()> {
        let own = self.params();
        for name in stored.keys() {
            if !own.contains_key(name) {
                return Err(BucketError::Config(format!(
                    "unknown {} parameter {:?} in header",
                    self.name(),
                    name
                )));
            }
        }
        for (name, value) in &own {
            match stored.get(name) {
                None => {
                    return Err(BucketError::Config(format!(
                        "{} parameter {:?} missing from header",
                        self.name(),
                        name
                    )))
                }
                Some(found) if found != value => {
                    return Err(BucketError::Config(format!(
                        "{} parameter {:?} is {:?} on disk, {:?} requested",
                        self.name(),
                        name,
                        found,
                        value
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Key for a lookup value
    fn make_key(&self, lookup: &Value) -> Result<Vec<u8>>;

    /// Key and stored value for a record; `None` means "do not index"
    fn make_key_value(&self, record: &Document) -> Result<Option<(Vec<u8>, Option<Document>)>>;

    /// Hash used to pick a key's home slot
    fn slot_hash(&self, key: &[u8]) -> u64 {
        crc32fast::hash(key) as u64
    }
}

impl KeyStrategy for Box<dyn KeyStrategy> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn key_width(&self) -> usize {
        (**self).key_width()
    }

    fn params(&self) -> BTreeMap<String, String> {
        (**self).params()
    }

    fn check_params(&self, stored: &BTreeMap<String, String>) -> Result<()> {
        (**self).check_params(stored)
    }

    fn make_key(&self, lookup: &Value) -> Result<Vec<u8>> {
        (**self).make_key(lookup)
    }

    fn make_key_value(&self, record: &Document) -> Result<Option<(Vec<u8>, Option<Document>)>> {
        (**self).make_key_value(record)
    }

    fn slot_hash(&self, key: &[u8]) -> u64 {
        (**self).slot_hash(key)
    }
}

/// Rebuild the strategy an index was created with from its header
pub fn strategy_from_header(header: &IndexHeader) -> Result<Box<dyn KeyStrategy>> {
    let param = |name: &str| {
        header.params.get(name).cloned().ok_or_else(|| {
            BucketError::Config(format!("{} parameter {:?} missing from header", header.strategy, name))
        })
    };

    let strategy: Box<dyn KeyStrategy> = match header.strategy.as_str() {
        ContentHashKey::NAME => Box::new(ContentHashKey::new(param("field")?)),
        IdKey::NAME => {
            let width = param("width")?
                .parse::<usize>()
                .map_err(|e| BucketError::Config(format!("bad id key width: {}", e)))?;
            Box::new(IdKey::new(width))
        }
        other => {
            return Err(BucketError::Config(format!("unknown key strategy {:?}", other)));
        }
    };

    strategy.check_params(&header.params)?;
    Ok(strategy)
}
