//! SQLite-backed office directory cache.
//!
//! The database lives at `~/.officedir/offices.db` by default and is a
//! disposable cache of the board API: a full sync rebuilds it from scratch.
//! Besides the `offices` table it stores the sync watermarks in `sync_state`.

mod offices;
mod sync_state;

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use thiserror::Error;

pub use sync_state::{LAST_FULL_SYNC_KEY, LAST_INCREMENTAL_SYNC_KEY};

use crate::types::{OfficeRecord, SyncWatermark};

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(#[from] crate::migrations::MigrationError),
}

/// SQLite connection wrapper for the office directory.
///
/// Not `Sync`: the process keeps one behind a `parking_lot::Mutex` and the
/// sync passes take the lock for one store call at a time.
pub struct OfficeDb {
    conn: Connection,
}

impl OfficeDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Open (or create) the database at the default location.
    pub fn open() -> Result<Self, DbError> {
        Self::open_at(Self::default_path()?)
    }

    /// Open (or create) a database at an explicit path and apply migrations.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL keeps directory searches readable while a pass is writing.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        Self::init(conn)
    }

    /// Open a private in-memory database. Used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        let applied = crate::migrations::run_migrations(&conn)?;
        if applied > 0 {
            log::info!("Office database: applied {} migration(s)", applied);
        }
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.officedir/offices.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".officedir").join("offices.db"))
    }
}

/// Store operations the sync orchestrator depends on.
pub trait OfficeStore: Send + Sync {
    fn upsert_offices(&self, records: &[OfficeRecord]) -> Result<usize, DbError>;
    fn delete_offices(&self, ids: &[String]) -> Result<usize, DbError>;
    fn count_offices(&self) -> Result<usize, DbError>;
    fn list_offices(&self) -> Result<Vec<OfficeRecord>, DbError>;
    fn clear_offices(&self) -> Result<usize, DbError>;
    fn load_watermark(&self) -> Result<SyncWatermark, DbError>;
    fn set_last_full_sync(&self, timestamp: &str) -> Result<(), DbError>;
    fn set_last_incremental_sync(&self, timestamp: &str) -> Result<(), DbError>;
}

impl OfficeStore for parking_lot::Mutex<OfficeDb> {
    fn upsert_offices(&self, records: &[OfficeRecord]) -> Result<usize, DbError> {
        self.lock().upsert_offices(records)
    }

    fn delete_offices(&self, ids: &[String]) -> Result<usize, DbError> {
        self.lock().delete_offices(ids)
    }

    fn count_offices(&self) -> Result<usize, DbError> {
        self.lock().count_offices()
    }

    fn list_offices(&self) -> Result<Vec<OfficeRecord>, DbError> {
        self.lock().list_offices()
    }

    fn clear_offices(&self) -> Result<usize, DbError> {
        self.lock().clear_offices()
    }

    fn load_watermark(&self) -> Result<SyncWatermark, DbError> {
        self.lock().load_watermark()
    }

    fn set_last_full_sync(&self, timestamp: &str) -> Result<(), DbError> {
        self.lock().set_last_full_sync(timestamp)
    }

    fn set_last_incremental_sync(&self, timestamp: &str) -> Result<(), DbError> {
        self.lock().set_last_incremental_sync(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_at_creates_parent_and_tables() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("offices.db");
        let db = OfficeDb::open_at(&path).expect("Failed to open test database");
        assert!(path.exists());

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM offices", [], |row| row.get(0))
            .expect("offices table should exist");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("offices.db");
        {
            let db = OfficeDb::open_at(&path).unwrap();
            db.set_last_full_sync("2024-05-01T00:00:00Z").unwrap();
        }
        let db = OfficeDb::open_at(&path).unwrap();
        assert_eq!(
            db.load_watermark().unwrap().last_full_sync,
            "2024-05-01T00:00:00Z"
        );
    }
}
