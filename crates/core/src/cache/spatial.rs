//! Geohash-keyed in-memory cache with fixed TTL and LRU eviction.
//!
//! Keys are geohashes at a precision fixed per instance. Expiry is absolute
//! (`inserted_at + ttl`), never sliding. The capacity policy runs synchronously
//! inside every `set`: expired entries go first, then least-recently-accessed
//! entries until the cache is back at `max_entries`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::persist::{PersistedCache, PersistedEntry};
use crate::Error;
use crate::clock::Clock;
use crate::geo::geohash;

/// Default geohash precision (≈4.9 km cells).
pub const DEFAULT_PRECISION: usize = 5;

/// Default entry bound.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Default time-to-live (6 hours).
pub const DEFAULT_TTL_SECS: i64 = 6 * 60 * 60;

/// Longest accepted time-to-live (30 days).
pub const MAX_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Construction-time cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub precision: usize,
    pub max_entries: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { precision: DEFAULT_PRECISION, max_entries: DEFAULT_MAX_ENTRIES, ttl: Duration::seconds(DEFAULT_TTL_SECS) }
    }
}

/// An immutable cached value. Replaced wholesale on every write.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialCacheEntry<T> {
    pub key: String,
    pub value: T,
    pub inserted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> SpatialCacheEntry<T> {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Lifetime and access recency of one cached cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInfo {
    pub geohash: String,
    pub inserted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

/// Result of [`SpatialCache::insert`].
#[derive(Debug, Clone)]
pub struct CacheWrite<T> {
    pub entry: Arc<SpatialCacheEntry<T>>,
    /// Keys the capacity policy removed to make room, expired ones included.
    pub evicted: Vec<String>,
}

/// Read-only diagnostics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub entry_count: usize,
    pub last_cleanup_at: Option<DateTime<Utc>>,
    pub max_entries: usize,
    pub precision: usize,
}

/// Counts from restoring a persisted document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub restored: usize,
    pub expired: usize,
    pub discarded: usize,
}

/// Entry plus its access recency. Recency lives outside the entry so reads
/// never rewrite the cached value.
#[derive(Debug)]
struct Slot<T> {
    entry: Arc<SpatialCacheEntry<T>>,
    last_accessed_at: DateTime<Utc>,
    access_seq: u64,
}

#[derive(Debug)]
struct Inner<T> {
    slots: HashMap<String, Slot<T>>,
    next_seq: u64,
    last_cleanup_at: Option<DateTime<Utc>>,
}

impl<T> Inner<T> {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Geohash-keyed TTL + LRU cache.
pub struct SpatialCache<T> {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner<T>>,
}

impl<T> std::fmt::Debug for SpatialCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialCache").field("config", &self.config).finish_non_exhaustive()
    }
}

impl<T: Clone> SpatialCache<T> {
    /// Create an empty cache.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPrecision` for precision outside 1..=12 and
    /// `Error::InvalidInput` for a zero entry bound or a TTL outside
    /// `(0, MAX_TTL_SECS]`.
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self, Error> {
        if !(geohash::MIN_PRECISION..=geohash::MAX_PRECISION).contains(&config.precision) {
            return Err(Error::InvalidPrecision(config.precision));
        }
        if config.max_entries == 0 {
            return Err(Error::InvalidInput("max_entries must be at least 1".into()));
        }
        if config.ttl <= Duration::zero() {
            return Err(Error::InvalidInput("ttl must be positive".into()));
        }
        if config.ttl > Duration::seconds(MAX_TTL_SECS) {
            return Err(Error::InvalidInput(format!("ttl must not exceed {MAX_TTL_SECS}s")));
        }

        Ok(Self {
            config,
            clock,
            inner: Mutex::new(Inner { slots: HashMap::new(), next_seq: 0, last_cleanup_at: None }),
        })
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Geohash key for a coordinate at this cache's precision.
    pub fn key_for(&self, lat: f64, lon: f64) -> Result<String, Error> {
        geohash::encode(lat, lon, self.config.precision)
    }

    fn is_structurally_sound(&self, key: &str, entry: &SpatialCacheEntry<T>) -> bool {
        entry.key == key
            && key.len() == self.config.precision
            && geohash::is_valid(key)
            && entry.expires_at > entry.inserted_at
    }

    /// Fetch a live entry and mark it accessed.
    ///
    /// Missing, expired and corrupt entries all read as `None`; corrupt ones
    /// are logged and dropped.
    pub fn get_entry(&self, key: &str) -> Option<Arc<SpatialCacheEntry<T>>> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let entry = Arc::clone(&inner.slots.get(key)?.entry);

        if !self.is_structurally_sound(key, &entry) {
            tracing::warn!(geohash = %key, "discarding corrupt cache entry");
            inner.slots.remove(key);
            return None;
        }

        if entry.is_expired_at(now) {
            return None;
        }

        let seq = inner.next_seq();
        if let Some(slot) = inner.slots.get_mut(key) {
            slot.last_accessed_at = now;
            slot.access_seq = seq;
        }

        Some(entry)
    }

    /// Fetch a live value by geohash key.
    pub fn get(&self, key: &str) -> Option<T> {
        self.get_entry(key).map(|entry| entry.value.clone())
    }

    /// An expired entry that eviction has not reached yet.
    ///
    /// Used only to label last-known-good data after every tier has failed.
    /// Does not count as an access.
    pub fn get_stale(&self, key: &str) -> Option<Arc<SpatialCacheEntry<T>>> {
        let now = self.clock.now();
        let inner = self.lock();
        let slot = inner.slots.get(key)?;
        (slot.entry.is_expired_at(now) && self.is_structurally_sound(key, &slot.entry)).then(|| Arc::clone(&slot.entry))
    }

    /// Read an entry, live or expired, without touching its recency.
    pub fn peek_entry(&self, key: &str) -> Option<Arc<SpatialCacheEntry<T>>> {
        self.lock().slots.get(key).map(|slot| Arc::clone(&slot.entry))
    }

    /// When `key` was last read or written.
    pub fn last_accessed_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.lock().slots.get(key).map(|slot| slot.last_accessed_at)
    }

    /// Every held cell with its recency, sorted by geohash.
    pub fn cells(&self) -> Vec<CellInfo> {
        let inner = self.lock();
        let mut cells: Vec<CellInfo> = inner
            .slots
            .iter()
            .map(|(key, slot)| CellInfo {
                geohash: key.clone(),
                inserted_at: slot.entry.inserted_at,
                expires_at: slot.entry.expires_at,
                last_accessed_at: slot.last_accessed_at,
            })
            .collect();
        cells.sort_by(|a, b| a.geohash.cmp(&b.geohash));
        cells
    }

    /// Upsert the value for the cell containing `(lat, lon)`.
    ///
    /// Returns the entry written and the keys evicted to make room for it.
    pub fn insert(&self, lat: f64, lon: f64, value: T) -> Result<CacheWrite<T>, Error> {
        let key = self.key_for(lat, lon)?;
        let now = self.clock.now();
        let entry = Arc::new(SpatialCacheEntry {
            key: key.clone(),
            value,
            inserted_at: now,
            expires_at: now + self.config.ttl,
        });

        let mut inner = self.lock();
        let seq = inner.next_seq();
        inner.slots.insert(key, Slot { entry: Arc::clone(&entry), last_accessed_at: now, access_seq: seq });
        let evicted = self.enforce_capacity(&mut inner, now);

        Ok(CacheWrite { entry, evicted })
    }

    /// Upsert the value for the cell containing `(lat, lon)`.
    ///
    /// Returns the geohash key written.
    pub fn set(&self, lat: f64, lon: f64, value: T) -> Result<String, Error> {
        self.insert(lat, lon, value).map(|write| write.entry.key.clone())
    }

    /// Drop expired entries, then least-recently-accessed ones down to capacity.
    ///
    /// Returns the removed keys.
    fn enforce_capacity(&self, inner: &mut Inner<T>, now: DateTime<Utc>) -> Vec<String> {
        let mut removed: Vec<String> =
            inner.slots.iter().filter(|(_, slot)| slot.entry.is_expired_at(now)).map(|(key, _)| key.clone()).collect();
        for key in &removed {
            inner.slots.remove(key);
        }
        let expired = removed.len();
        inner.last_cleanup_at = Some(now);

        let excess = inner.slots.len().saturating_sub(self.config.max_entries);
        if excess > 0 {
            let mut by_recency: Vec<(DateTime<Utc>, u64, String)> = inner
                .slots
                .iter()
                .map(|(key, slot)| (slot.last_accessed_at, slot.access_seq, key.clone()))
                .collect();
            by_recency.sort_unstable();

            for (_, _, key) in by_recency.into_iter().take(excess) {
                inner.slots.remove(&key);
                removed.push(key);
            }
        }

        if expired > 0 || excess > 0 {
            tracing::debug!(expired, evicted = excess, remaining = inner.slots.len(), "cache capacity policy applied");
        }
        removed
    }

    /// Remove one entry. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().slots.remove(key).is_some()
    }

    /// Wipe every entry and reset metadata.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.slots.clear();
        inner.last_cleanup_at = None;
    }

    pub fn metadata(&self) -> CacheMetadata {
        let inner = self.lock();
        CacheMetadata {
            entry_count: inner.slots.len(),
            last_cleanup_at: inner.last_cleanup_at,
            max_entries: self.config.max_entries,
            precision: self.config.precision,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Presence check that does not count as an access.
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().slots.contains_key(key)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().slots.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl<T: Clone + Serialize> SpatialCache<T> {
    /// Export every entry, expired ones included, in the persisted layout.
    pub fn snapshot(&self) -> Result<PersistedCache, Error> {
        let inner = self.lock();
        let mut doc = PersistedCache {
            entry_count: inner.slots.len(),
            last_cleanup_at_epoch_ms: inner.last_cleanup_at.map(|t| t.timestamp_millis()),
            ..Default::default()
        };
        for (key, slot) in &inner.slots {
            doc.entries
                .insert(key.clone(), PersistedEntry::from_entry(&slot.entry)?.accessed_at(slot.last_accessed_at));
        }
        Ok(doc)
    }
}

impl<T: Clone + DeserializeOwned> SpatialCache<T> {
    /// Load a persisted document, validating every entry on its own.
    ///
    /// Invalid entries are skipped rather than failing the restore.
    pub fn restore(&self, doc: &PersistedCache) -> RestoreStats {
        let now = self.clock.now();
        let mut stats = RestoreStats::default();
        let mut inner = self.lock();

        for (key, persisted) in &doc.entries {
            let entry = match persisted.to_entry::<T>(key) {
                Ok(entry) if self.is_structurally_sound(key, &entry) => entry,
                Ok(_) => {
                    tracing::warn!(geohash = %key, "discarding persisted entry with invalid shape");
                    stats.discarded += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(geohash = %key, error = %e, "discarding undecodable persisted entry");
                    stats.discarded += 1;
                    continue;
                }
            };

            if entry.is_expired_at(now) {
                stats.expired += 1;
                continue;
            }

            let seq = inner.next_seq();
            let last_accessed_at = persisted
                .last_accessed_at_epoch_ms
                .and_then(DateTime::from_timestamp_millis)
                .map_or(entry.inserted_at, |at| at.max(entry.inserted_at));
            inner.slots.insert(key.clone(), Slot { entry: Arc::new(entry), last_accessed_at, access_seq: seq });
            stats.restored += 1;
        }

        inner.last_cleanup_at = doc.last_cleanup_at_epoch_ms.and_then(DateTime::from_timestamp_millis);
        self.enforce_capacity(&mut inner, now);

        tracing::debug!(
            restored = stats.restored,
            expired = stats.expired,
            discarded = stats.discarded,
            "restored spatial cache"
        );
        stats
    }
}

#[cfg(test)]
impl<T: Clone> SpatialCache<T> {
    /// Plant an arbitrary entry under `key`, bypassing validation.
    pub(crate) fn insert_unchecked(&self, key: &str, entry: SpatialCacheEntry<T>) {
        let now = self.clock.now();
        let mut inner = self.lock();
        let seq = inner.next_seq();
        inner.slots.insert(key.to_string(), Slot { entry: Arc::new(entry), last_accessed_at: now, access_seq: seq });
    }
}
