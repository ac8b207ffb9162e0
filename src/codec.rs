//! Value codecs
//!
//! The value store keeps opaque payloads with no length prefix; a codec turns
//! application values into those payloads and back. The codec id is written
//! into the value store header so a file is always read with the codec that
//! wrote it.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Maximum codec id length that fits in the value store header
pub const MAX_CODEC_ID_LEN: usize = 32;

/// Encode/decode strategy for value store payloads
pub trait ValueCodec<T>: Send + Sync {
    /// Stable identifier persisted in the value store header
    fn id(&self) -> &str;

    fn encode(&self, value: &T) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// Default codec: bincode over any serde type
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub const ID: &'static str = "bincode-v1";

    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ValueCodec<T> for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn id(&self) -> &str {
        Self::ID
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Identity codec for callers that already hold encoded bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct RawCodec;

impl RawCodec {
    pub const ID: &'static str = "raw-v1";
}

impl ValueCodec<Vec<u8>> for RawCodec {
    fn id(&self) -> &str {
        Self::ID
    }

    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
