//! Persisted sync watermarks (`sync_state` key/value table).

use rusqlite::{params, OptionalExtension};

use super::{DbError, OfficeDb};
use crate::types::{SyncWatermark, EPOCH_WATERMARK};

pub const LAST_FULL_SYNC_KEY: &str = "last_full_sync";
pub const LAST_INCREMENTAL_SYNC_KEY: &str = "last_incremental_sync";

impl OfficeDb {
    fn get_state(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_state(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO sync_state (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    /// Both watermarks, defaulting to the epoch when never written.
    pub fn load_watermark(&self) -> Result<SyncWatermark, DbError> {
        Ok(SyncWatermark {
            last_full_sync: self
                .get_state(LAST_FULL_SYNC_KEY)?
                .unwrap_or_else(|| EPOCH_WATERMARK.to_string()),
            last_incremental_sync: self
                .get_state(LAST_INCREMENTAL_SYNC_KEY)?
                .unwrap_or_else(|| EPOCH_WATERMARK.to_string()),
        })
    }

    pub fn set_last_full_sync(&self, timestamp: &str) -> Result<(), DbError> {
        self.set_state(LAST_FULL_SYNC_KEY, timestamp)
    }

    pub fn set_last_incremental_sync(&self, timestamp: &str) -> Result<(), DbError> {
        self.set_state(LAST_INCREMENTAL_SYNC_KEY, timestamp)
    }
}
