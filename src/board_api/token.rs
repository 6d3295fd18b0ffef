//! OAuth2 client-credentials token provider.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::AuthError;

/// Scope requested for read access to the board API.
pub const DDF_SCOPE: &str = "DDFApi_Read";

/// Tokens within this many seconds of expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Upper bound on a server-reported token lifetime (one year).
const MAX_EXPIRES_IN_SECS: u64 = 86_400 * 365;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expiry: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now + Duration::seconds(EXPIRY_MARGIN_SECS)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

/// Obtains and caches bearer tokens for the board API.
///
/// The cache lock is held across the exchange, so concurrent callers wait
/// for a single in-flight refresh instead of each starting their own.
pub struct TokenProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(
        http: reqwest::Client,
        token_url: &str,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.to_string(),
            client_id: client_id.filter(|s| !s.trim().is_empty()),
            client_secret: client_secret.filter(|s| !s.trim().is_empty()),
            cached: Mutex::new(None),
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// Return the cached token if still valid, otherwise exchange credentials for a new one.
    pub async fn get_valid_token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if !token.is_expired(Utc::now()) {
                return Ok(token.access_token.clone());
            }
            log::debug!("Board API token expired at {}, refreshing", token.expiry);
        }

        let fresh = self.exchange_credentials().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Drop the cached token so the next call performs a fresh exchange.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn exchange_credentials(&self) -> Result<CachedToken, AuthError> {
        let (Some(client_id), Some(client_secret)) =
            (self.client_id.as_deref(), self.client_secret.as_deref())
        else {
            return Err(AuthError::MissingCredentials);
        };

        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", DDF_SCOPE),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            log::warn!("Board API token exchange rejected: HTTP {}", status);
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::MalformedResponse("No access_token in response".into()))?;
        let expires_in = parsed
            .expires_in
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .min(MAX_EXPIRES_IN_SECS);
        let expiry = i64::try_from(expires_in)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::MalformedResponse(format!("Unusable expires_in: {}", expires_in))
            })?;

        log::info!("Board API token obtained, expires at {}", expiry.to_rfc3339());

        Ok(CachedToken {
            access_token,
            expiry,
        })
    }
}
