//! Local directory of brokerage offices kept in sync with the board API.
//!
//! A full pass loads every active Firm office; recurring incremental passes
//! apply changes since the last watermark. Everything is cached in SQLite
//! and searched locally.

pub mod board_api;
pub mod db;
pub mod error;
pub mod migrations;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod sync;
pub mod types;

pub use error::{ConfigError, SyncError};
pub use state::DirectoryState;
