//! Encoding of persisted column values.
//!
//! | Value | Encoding |
//! |-------|----------|
//! | Revision vector | CBOR blob |
//! | Change properties | JSON text |
//! | Timestamp | Unix milliseconds |

use crate::error::StoreError;
use chrono::{DateTime, TimeZone, Utc};
use synclog_core::RevisionVector;

/// Serialize a revision vector to CBOR bytes.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn encode_revisions(revisions: &RevisionVector) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(revisions, &mut bytes).map_err(|e| StoreError::Codec(e.to_string()))?;
    Ok(bytes)
}

/// Deserialize a revision vector from CBOR bytes.
///
/// # Errors
///
/// Returns error if the bytes are not a valid revision vector.
pub fn decode_revisions(bytes: &[u8]) -> Result<RevisionVector, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Codec(e.to_string()))
}

/// Serialize change properties to JSON text.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn encode_properties(properties: &serde_json::Value) -> Result<String, StoreError> {
    serde_json::to_string(properties).map_err(|e| StoreError::Codec(e.to_string()))
}

/// Deserialize change properties from JSON text.
///
/// # Errors
///
/// Returns error if the text is not valid JSON.
pub fn decode_properties(text: &str) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::Codec(e.to_string()))
}

/// Convert a timestamp to unix milliseconds.
#[must_use]
pub fn encode_timestamp(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_millis()
}

/// Convert unix milliseconds to a timestamp.
///
/// # Errors
///
/// Returns error if the value is out of range.
pub fn decode_timestamp(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::InvalidData(format!("timestamp out of range: {millis}")))
}

/// Convert an unsigned counter to a `SQLite` integer.
///
/// # Errors
///
/// Returns error if the value exceeds `i64::MAX`.
pub fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidData(format!("counter too large: {value}")))
}

/// Convert a `SQLite` integer back to an unsigned counter.
///
/// # Errors
///
/// Returns error if the value is negative.
pub fn to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::InvalidData(format!("negative counter: {value}")))
}
