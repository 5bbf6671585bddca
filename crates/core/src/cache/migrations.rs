//! Versioned schema for the cache store.
//!
//! Applied versions are recorded in `schema_version`. Each pending step runs
//! in its own transaction together with its version row, so a failed step
//! leaves the schema at the previous version.

use super::Error;
use tokio_rusqlite::{Connection, params, rusqlite};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "cache_entries",
        sql: include_str!("../../migrations/001_cache_entries.sql"),
    },
    Migration { version: 2, name: "cache_meta", sql: include_str!("../../migrations/002_cache_meta.sql") },
    Migration {
        version: 3,
        name: "entry_recency",
        sql: include_str!("../../migrations/003_entry_recency.sql"),
    },
];

/// Highest schema version this build knows.
pub const LATEST_VERSION: i64 = 3;

fn current_version(conn: &rusqlite::Connection) -> Result<i64, Error> {
    Ok(conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))?)
}

/// Bring the schema up to [`LATEST_VERSION`].
///
/// # Errors
///
/// `MigrationFailed` if a step fails or the database was written by a newer build.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at_ms INTEGER NOT NULL
            )",
            [],
        )?;

        let current = current_version(conn)?;
        if current > LATEST_VERSION {
            return Err(Error::MigrationFailed(format!(
                "database schema v{current} is newer than supported v{LATEST_VERSION}"
            )));
        }

        for step in MIGRATIONS.iter().filter(|m| m.version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(step.sql)
                .map_err(|e| Error::MigrationFailed(format!("v{} {}: {e}", step.version, step.name)))?;
            tx.execute(
                "INSERT INTO schema_version (version, name, applied_at_ms) VALUES (?1, ?2, ?3)",
                params![step.version, step.name, chrono::Utc::now().timestamp_millis()],
            )?;
            tx.commit()?;
            tracing::debug!(version = step.version, name = step.name, "applied cache migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

/// The schema version recorded in `conn`.
pub async fn version(conn: &Connection) -> Result<i64, Error> {
    conn.call(|conn| current_version(conn)).await.map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_list_is_ordered() {
        assert!(MIGRATIONS.windows(2).all(|w| w[0].version < w[1].version));
        assert_eq!(MIGRATIONS.last().map(|m| m.version), Some(LATEST_VERSION));
    }

    #[tokio::test]
    async fn test_run_twice_is_a_no_op() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        assert_eq!(version(&conn).await.unwrap(), LATEST_VERSION);
        let rows: i64 = conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(rows, MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn test_newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        conn.call(|conn| {
            conn.execute("INSERT INTO schema_version (version, name, applied_at_ms) VALUES (99, 'future', 0)", [])
        })
        .await
        .unwrap();

        assert!(matches!(run(&conn).await, Err(Error::MigrationFailed(_))));
    }
}
