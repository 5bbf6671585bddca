//! Cache persistence operations.
//!
//! Mirrors the [`PersistedCache`] layout in two tables: `cache_entries`
//! (one row per namespace and geohash) and `cache_meta` (one row per
//! namespace). Rows are decoded independently on load; rows that fail to
//! decode are deleted.

use super::connection::CacheStore;
use super::persist::{PersistedCache, PersistedEntry};
use crate::Error;
use serde_json::Value;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// A row as read, before validation.
struct RawRow {
    rowid: i64,
    geohash: Option<String>,
    payload_json: Option<String>,
    inserted_at_ms: Option<i64>,
    expires_at_ms: Option<i64>,
    last_accessed_at_ms: Option<i64>,
}

impl RawRow {
    fn decode(self) -> Result<(String, PersistedEntry), i64> {
        let (Some(geohash), Some(payload_json), Some(inserted_at_epoch_ms), Some(expires_at_epoch_ms)) =
            (self.geohash, self.payload_json, self.inserted_at_ms, self.expires_at_ms)
        else {
            return Err(self.rowid);
        };
        let payload: Value = serde_json::from_str(&payload_json).map_err(|_| self.rowid)?;
        Ok((geohash, PersistedEntry {
            payload,
            inserted_at_epoch_ms,
            expires_at_epoch_ms,
            last_accessed_at_epoch_ms: self.last_accessed_at_ms,
        }))
    }
}

fn write_entry(conn: &rusqlite::Connection, ns: &str, key: &str, entry: &PersistedEntry) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO cache_entries
            (namespace, geohash, payload_json, inserted_at_ms, expires_at_ms, last_accessed_at_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(namespace, geohash) DO UPDATE SET
            payload_json = excluded.payload_json,
            inserted_at_ms = excluded.inserted_at_ms,
            expires_at_ms = excluded.expires_at_ms,
            last_accessed_at_ms = excluded.last_accessed_at_ms",
        params![
            ns,
            key,
            entry.payload.to_string(),
            entry.inserted_at_epoch_ms,
            entry.expires_at_epoch_ms,
            entry.last_accessed_at_epoch_ms
        ],
    )?;
    Ok(())
}

fn write_meta(
    conn: &rusqlite::Connection, ns: &str, entry_count: i64, last_cleanup_at_ms: Option<i64>,
) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO cache_meta (namespace, entry_count, last_cleanup_at_ms) VALUES (?1, ?2, ?3)
        ON CONFLICT(namespace) DO UPDATE SET
            entry_count = excluded.entry_count,
            last_cleanup_at_ms = excluded.last_cleanup_at_ms",
        params![ns, entry_count, last_cleanup_at_ms],
    )?;
    Ok(())
}

impl CacheStore {
    /// Replace the stored cache with `doc` in one transaction.
    pub async fn save(&self, doc: &PersistedCache) -> Result<(), Error> {
        let doc = doc.clone();
        let ns = self.namespace.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM cache_entries WHERE namespace = ?1", params![&*ns])?;
                for (key, entry) in &doc.entries {
                    write_entry(&tx, &ns, key, entry)?;
                }
                write_meta(&tx, &ns, doc.entries.len() as i64, doc.last_cleanup_at_epoch_ms)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Load the stored cache.
    ///
    /// Rows with missing columns or unparseable payloads are dropped from the
    /// result and deleted from the table.
    pub async fn load(&self) -> Result<PersistedCache, Error> {
        let ns = self.namespace.clone();
        self.conn
            .call(move |conn| -> Result<PersistedCache, Error> {
                let rows: Vec<RawRow> = {
                    let mut stmt = conn.prepare(
                        "SELECT rowid, geohash, payload_json, inserted_at_ms, expires_at_ms, last_accessed_at_ms
                        FROM cache_entries WHERE namespace = ?1",
                    )?;
                    let mapped = stmt.query_map(params![&*ns], |row| {
                        Ok(RawRow {
                            rowid: row.get(0)?,
                            geohash: row.get(1).ok(),
                            payload_json: row.get(2).ok(),
                            inserted_at_ms: row.get(3).ok(),
                            expires_at_ms: row.get(4).ok(),
                            last_accessed_at_ms: row.get::<_, Option<i64>>(5).ok().flatten(),
                        })
                    })?;
                    mapped.collect::<Result<_, _>>()?
                };

                let mut doc = PersistedCache::default();
                let mut corrupt = Vec::new();
                for row in rows {
                    match row.decode() {
                        Ok((key, entry)) => {
                            doc.entries.insert(key, entry);
                        }
                        Err(rowid) => corrupt.push(rowid),
                    }
                }

                for rowid in &corrupt {
                    conn.execute("DELETE FROM cache_entries WHERE rowid = ?1", params![rowid])?;
                }
                if !corrupt.is_empty() {
                    tracing::warn!(count = corrupt.len(), "deleted corrupt persisted cache rows");
                }

                doc.entry_count = doc.entries.len();
                doc.last_cleanup_at_epoch_ms = conn
                    .query_row("SELECT last_cleanup_at_ms FROM cache_meta WHERE namespace = ?1", params![&*ns], |row| {
                        row.get::<_, Option<i64>>(0)
                    })
                    .optional()?
                    .flatten();

                Ok(doc)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a single entry.
    pub async fn upsert_entry(&self, key: &str, entry: &PersistedEntry) -> Result<(), Error> {
        let key = key.to_string();
        let entry = entry.clone();
        let ns = self.namespace.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> { write_entry(conn, &ns, &key, &entry) })
            .await
            .map_err(Error::from)
    }

    /// Upsert `key` and delete the `evicted` cells in one transaction.
    ///
    /// Keeps the table in step with an in-memory write that pushed other
    /// cells out.
    pub async fn upsert_evicting(&self, key: &str, entry: &PersistedEntry, evicted: &[String]) -> Result<(), Error> {
        let key = key.to_string();
        let entry = entry.clone();
        let evicted = evicted.to_vec();
        let ns = self.namespace.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for gone in &evicted {
                    tx.execute("DELETE FROM cache_entries WHERE namespace = ?1 AND geohash = ?2", params![&*ns, gone])?;
                }
                write_entry(&tx, &ns, &key, &entry)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a single entry. Returns whether a row was removed.
    pub async fn remove_entry(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        let ns = self.namespace.clone();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count =
                    conn.execute("DELETE FROM cache_entries WHERE namespace = ?1 AND geohash = ?2", params![&*ns, key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Wipe every entry and reset metadata.
    pub async fn clear(&self) -> Result<u64, Error> {
        let ns = self.namespace.clone();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM cache_entries WHERE namespace = ?1", params![&*ns])?;
                conn.execute("DELETE FROM cache_meta WHERE namespace = ?1", params![&*ns])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries whose expiry is at or before `now_ms`.
    pub async fn purge_expired(&self, now_ms: i64) -> Result<u64, Error> {
        let ns = self.namespace.clone();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE namespace = ?1 AND expires_at_ms <= ?2",
                    params![&*ns, now_ms],
                )?;
                let remaining: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
                    params![&*ns],
                    |row| row.get(0),
                )?;
                write_meta(conn, &ns, remaining, Some(now_ms))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
