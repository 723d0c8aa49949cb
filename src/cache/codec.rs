//! Value Codec Module
//!
//! Turns caller values into the opaque byte payloads stored in the `val`
//! column and back.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CacheError, Result};

// == Codec ==
/// Serialization used by the typed store operations.
pub trait Codec: Send + Sync + 'static {
    fn encode<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>>;

    fn decode<V: DeserializeOwned>(&self, payload: &[u8]) -> Result<V>;
}

/// JSON payloads via serde_json.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<V: Serialize + ?Sized>(&self, value: &V) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CacheError::Codec(e.to_string()))
    }

    fn decode<V: DeserializeOwned>(&self, payload: &[u8]) -> Result<V> {
        serde_json::from_slice(payload).map_err(|e| CacheError::Codec(e.to_string()))
    }
}
