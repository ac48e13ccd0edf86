//! Structured serialization of stored records.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Error, Resource, Result};

/// A value persisted in a bucket.
pub trait Record: Serialize + DeserializeOwned {
    /// Resource kind reported in errors about this record.
    const RESOURCE: Resource;
}

/// Encode a record for storage.
pub fn marshal<T: Record>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::codec(T::RESOURCE, e))
}

/// Decode a stored record.
pub fn unmarshal<T: Record>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::codec(T::RESOURCE, e))
}
