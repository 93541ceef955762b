//! # Codecs
//!
//! Two encodings are in use:
//!
//! - **JSON** for client payloads (transactions, events) and for ledger
//!   records that carry [`Value`](crate::Value)s (accounts, receipts,
//!   contract storage). `Value` is untagged, which only self-describing
//!   formats can read back.
//! - **bincode** for consensus traffic and block records, whose contents
//!   are plain structs and opaque byte payloads.

use crate::errors::{CodecError, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a ledger record as JSON bytes.
pub fn encode_record<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|e| StorageError::Encoding(e.to_string()))
}

/// Decode a ledger record; `key` is only used for the error message.
pub fn decode_record<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Corruption {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: e.to_string(),
    })
}

/// Encode a client payload as JSON.
pub fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Json(e.to_string()))
}

/// Decode a client payload from JSON.
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Json(e.to_string()))
}

/// Encode a wire message with bincode.
pub fn to_wire<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError::Binary(e.to_string()))
}

/// Decode a wire message with bincode.
pub fn from_wire<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Binary(e.to_string()))
}
