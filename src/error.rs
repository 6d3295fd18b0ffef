//! Error types for sync passes and administrative actions
//!
//! Errors are classified by recoverability:
//! - Retryable: network issues, timeouts, upstream 5xx/429 (next pass may succeed)
//! - RequiresUserAction: missing or rejected credentials, invalid settings
//! - NonRetryable: everything else (local storage, malformed responses)

use thiserror::Error;

use crate::board_api::{AuthError, FetchError};
use crate::db::DbError;

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

/// Error returned by a sync pass or administrative action.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(AuthError),

    #[error("Fetch failed: {0}")]
    Fetch(FetchError),

    #[error("Store failed: {0}")]
    Store(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync pass cancelled by shutdown")]
    Cancelled,
}

impl From<FetchError> for SyncError {
    /// Token failures surface as `Auth` so callers can tell them apart.
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Auth(auth) => SyncError::Auth(auth),
            other => SyncError::Fetch(other),
        }
    }
}

impl From<AuthError> for SyncError {
    fn from(err: AuthError) -> Self {
        SyncError::Auth(err)
    }
}

impl SyncError {
    /// Returns true if the next scheduled pass may succeed without intervention
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Fetch(e) => e.is_transient(),
            SyncError::Auth(AuthError::Http(e)) => e.is_timeout() || e.is_connect(),
            SyncError::Cancelled => true,
            _ => false,
        }
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            SyncError::Auth(AuthError::MissingCredentials)
                | SyncError::Auth(AuthError::Rejected { .. })
                | SyncError::Config(_)
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SyncError::Auth(AuthError::MissingCredentials) => {
                "Set clientId and clientSecret in ~/.officedir/config.json."
            }
            SyncError::Auth(AuthError::Rejected { .. }) => {
                "Check the client ID and secret issued for the board API."
            }
            SyncError::Auth(_) => "Check your internet connection and try again.",
            SyncError::Fetch(e) if e.is_transient() => {
                "The board API is unavailable. The next scheduled sync will retry."
            }
            SyncError::Fetch(_) => "The board API returned an unexpected response.",
            SyncError::Store(_) => "Check file permissions and disk space for the database.",
            SyncError::Config(_) => "Check your configuration in ~/.officedir/config.json.",
            SyncError::Cancelled => "The sync was interrupted and will run again.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_auth_is_lifted_to_auth() {
        let err: SyncError = FetchError::Auth(AuthError::MissingCredentials).into();
        assert!(matches!(err, SyncError::Auth(AuthError::MissingCredentials)));
        assert!(err.requires_user_action());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_server_error_is_retryable() {
        let err: SyncError = FetchError::Status {
            status: 502,
            body: String::new(),
        }
        .into();
        assert!(err.is_retryable());
        assert!(!err.requires_user_action());

        let err: SyncError = FetchError::Status {
            status: 404,
            body: String::new(),
        }
        .into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_store_error_message() {
        let err: SyncError = DbError::HomeDirNotFound.into();
        assert_eq!(err.to_string(), "Store failed: Home directory not found");
        assert!(!err.is_retryable());
    }
}
