//! Repository layer: typed, context-aware SQLite persistence.
//!
//! One repository module per entity kind (`epic`, `feature`, `task`,
//! `task_history`), plus `schema` (idempotent `CREATE TABLE IF NOT EXISTS`)
//! and `migrations` (idempotent, hand-invokable schema evolution steps).
//! Per §4.12/§5 of the spec, the whole layer is synchronous: a single
//! `rusqlite::Connection` opened once per CLI invocation, passed by `&mut`
//! to the `SyncEngine`, with `UpsertTx` methods taking a `&Transaction`
//! directly so a sync can batch epics/features/tasks in one transaction.

mod flexible_key;
pub mod migrations;
pub mod schema;

pub mod epic_repo;
pub mod feature_repo;
pub mod task_history_repo;
pub mod task_repo;

pub use epic_repo::{EpicFilter, EpicRepository};
pub use feature_repo::{FeatureFilter, FeatureRepository};
pub use task_history_repo::TaskHistoryRepository;
pub use task_repo::{StatusCount, TaskFilter, TaskRepository};

use std::path::Path;

use rusqlite::Connection;

use crate::error::DocSyncError;

/// An opened, schema-initialized SQLite database. Owns the single
/// connection used for the lifetime of one CLI invocation.
pub struct Database {
    pub conn: Connection,
}

impl Database {
    /// Open (creating if absent) the database file at `path`, apply
    /// reliability pragmas, and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, DocSyncError> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        Ok(Self { conn })
    }

    /// An in-memory database, used by unit and scenario tests.
    pub fn open_in_memory() -> Result<Self, DocSyncError> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self { conn })
    }

    fn init_connection(conn: &Connection) -> Result<(), DocSyncError> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )?;
        schema::init(conn)?;
        Ok(())
    }

    /// The scalar `last_sync_at`, if one has ever been recorded.
    pub fn last_sync_at(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>, DocSyncError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = 'last_sync_at'",
                [],
                |row| row.get(0),
            )
            .optional_result()?;
        Ok(value.and_then(|v| chrono::DateTime::parse_from_rfc3339(&v).ok().map(|d| d.with_timezone(&chrono::Utc))))
    }

    /// Persist `last_sync_at`. Called by the sync engine only on a
    /// successful (non-dry-run, non-rolled-back) commit.
    pub fn set_last_sync_at(
        &self,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), DocSyncError> {
        self.conn.execute(
            "INSERT INTO sync_state (key, value) VALUES ('last_sync_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [at.to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Small extension trait so `query_row`'s `QueryReturnedNoRows` reads as
/// `Option<T>` at call sites instead of a manual match everywhere.
pub(crate) trait OptionalResultExt<T> {
    fn optional_result(self) -> Result<Option<T>, DocSyncError>;
}

impl<T> OptionalResultExt<T> for rusqlite::Result<T> {
    fn optional_result(self) -> Result<Option<T>, DocSyncError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DocSyncError::Db(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory_and_initializes_schema() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM epics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn last_sync_at_round_trips() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.last_sync_at().unwrap().is_none());
        let now = chrono::Utc::now();
        db.set_last_sync_at(now).unwrap();
        let loaded = db.last_sync_at().unwrap().unwrap();
        assert_eq!(loaded.timestamp(), now.timestamp());
    }
}
