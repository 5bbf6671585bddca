//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite database that backs cache
//! persistence, applying pragmas (WAL mode) and running migrations.

use super::migrations;
use crate::Error;
use std::path::Path;
use std::sync::Arc;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

/// Namespace used by [`CacheStore::open`] and [`CacheStore::open_in_memory`].
pub const DEFAULT_NAMESPACE: &str = "default";

/// Persistent store for the spatial cache.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. Several caches can share one database file by
/// taking handles on different namespaces.
#[derive(Clone, Debug)]
pub struct CacheStore {
    pub(crate) conn: Connection,
    pub(crate) namespace: Arc<str>,
}

impl CacheStore {
    /// Open a store at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Storage(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory store for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Storage(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Storage)?;

        migrations::run(&conn).await?;

        Ok(Self { conn, namespace: Arc::from(DEFAULT_NAMESPACE) })
    }

    /// A handle on the same database scoped to `namespace`.
    pub fn namespaced(&self, namespace: &str) -> Self {
        Self { conn: self.conn.clone(), namespace: Arc::from(namespace) }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}
