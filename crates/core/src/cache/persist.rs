//! Persisted cache layout.
//!
//! ```json
//! {
//!   "entries": {
//!     "gcpvj": {
//!       "payload": ...,
//!       "insertedAtEpochMs": 0,
//!       "expiresAtEpochMs": 0,
//!       "lastAccessedAtEpochMs": 0
//!     }
//!   },
//!   "entryCount": 1,
//!   "lastCleanupAtEpochMs": 0
//! }
//! ```
//!
//! Unknown fields are ignored. Each entry is decoded on its own so a single
//! corrupt entry is dropped instead of failing the whole document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::spatial::SpatialCacheEntry;
use crate::Error;

/// One cached payload with its lifetime, payload kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry {
    pub payload: Value,
    pub inserted_at_epoch_ms: i64,
    pub expires_at_epoch_ms: i64,
    /// Absent in documents written before recency was tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_at_epoch_ms: Option<i64>,
}

impl PersistedEntry {
    pub fn from_entry<T: Serialize>(entry: &SpatialCacheEntry<T>) -> Result<Self, Error> {
        Ok(Self {
            payload: serde_json::to_value(&entry.value)?,
            inserted_at_epoch_ms: entry.inserted_at.timestamp_millis(),
            expires_at_epoch_ms: entry.expires_at.timestamp_millis(),
            last_accessed_at_epoch_ms: None,
        })
    }

    pub fn accessed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_accessed_at_epoch_ms = Some(at.timestamp_millis());
        self
    }

    /// Decode into a typed entry stored under `key`.
    pub fn to_entry<T: DeserializeOwned>(&self, key: &str) -> Result<SpatialCacheEntry<T>, Error> {
        let inserted_at = DateTime::from_timestamp_millis(self.inserted_at_epoch_ms)
            .ok_or_else(|| Error::Serialization(format!("insertedAtEpochMs out of range for {key}")))?;
        let expires_at = DateTime::from_timestamp_millis(self.expires_at_epoch_ms)
            .ok_or_else(|| Error::Serialization(format!("expiresAtEpochMs out of range for {key}")))?;
        let value = serde_json::from_value(self.payload.clone())?;

        Ok(SpatialCacheEntry { key: key.to_string(), value, inserted_at, expires_at })
    }
}

/// The whole persisted cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCache {
    #[serde(default)]
    pub entries: BTreeMap<String, PersistedEntry>,
    #[serde(default)]
    pub entry_count: usize,
    #[serde(default)]
    pub last_cleanup_at_epoch_ms: Option<i64>,
}

impl PersistedCache {
    /// Parse a document, discarding malformed entries.
    ///
    /// Returns the document and the number of entries dropped.
    ///
    /// # Errors
    ///
    /// Fails only if the input is not a JSON object at all.
    pub fn from_json_str(input: &str) -> Result<(Self, usize), Error> {
        let root: Value = serde_json::from_str(input)?;
        let Value::Object(mut root) = root else {
            return Err(Error::Serialization("persisted cache must be a JSON object".into()));
        };

        let mut doc = PersistedCache::default();
        let mut discarded = 0;

        if let Some(Value::Object(entries)) = root.remove("entries") {
            for (key, raw) in entries {
                match serde_json::from_value::<PersistedEntry>(raw) {
                    Ok(entry) => {
                        doc.entries.insert(key, entry);
                    }
                    Err(e) => {
                        tracing::warn!(geohash = %key, error = %e, "skipping malformed persisted entry");
                        discarded += 1;
                    }
                }
            }
        }

        doc.entry_count = root
            .get("entryCount")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(doc.entries.len());
        doc.last_cleanup_at_epoch_ms = root.get("lastCleanupAtEpochMs").and_then(Value::as_i64);

        Ok((doc, discarded))
    }

    pub fn to_json_string(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}
