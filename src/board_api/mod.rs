//! CREA board API client.
//!
//! Direct HTTP via reqwest against the DDF board endpoint. Authentication is
//! an OAuth2 client-credentials exchange; the resulting bearer token is cached
//! until shortly before it expires.
//!
//! Modules:
//! - token: client-credentials exchange + token cache
//! - models: wire types for the `/Office` endpoint
//! - client: paginated office fetch, Firm filtering, website derivation

pub mod client;
pub mod models;
pub mod token;

pub use client::{BoardApiClient, OfficeSource};
pub use token::TokenProvider;

// ============================================================================
// Error types
// ============================================================================

/// Credential or token failure. Fatal for the current pass.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Client ID and client secret must both be configured")]
    MissingCredentials,
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token exchange rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Malformed token response: {0}")]
    MalformedResponse(String),
}

/// Failure while walking the office pages. Aborts the whole fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Unable to obtain access token: {0}")]
    Auth(#[from] AuthError),
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Failed to decode office page: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Unexpected API response structure: {0}")]
    UnexpectedShape(String),
    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl FetchError {
    /// Timeouts, connection failures and 5xx/429 responses may succeed next pass.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect(),
            FetchError::Auth(AuthError::Http(e)) => e.is_timeout() || e.is_connect(),
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
