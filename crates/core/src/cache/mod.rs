//! Geohash-keyed spatial cache and its SQLite persistence.
//!
//! - [`SpatialCache`]: in-memory TTL + LRU cache, capacity enforced on every write
//! - [`PersistedCache`]: forward-compatible JSON layout validated per entry
//! - [`CacheStore`]: SQLite backing store (tokio-rusqlite, WAL, migrations)

pub mod connection;
pub mod migrations;
pub mod persist;
pub mod spatial;
pub mod store;

pub use crate::Error;

pub use connection::CacheStore;
pub use persist::{PersistedCache, PersistedEntry};
pub use spatial::{CacheConfig, CacheMetadata, CacheWrite, CellInfo, RestoreStats, SpatialCache, SpatialCacheEntry};
