use serde::{Deserialize, Serialize};

/// Watermark value used before any pass has completed.
pub const EPOCH_WATERMARK: &str = "1970-01-01T00:00:00Z";

/// Format used for every persisted watermark.
pub const WATERMARK_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Configuration stored in ~/.officedir/config.json.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_sync_interval_hours")]
    pub sync_interval_hours: u32,
    /// Board (officeAOR) filter passed through to the API. Empty means all boards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_filter: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
}

fn default_sync_interval_hours() -> u32 {
    24
}

fn default_api_base_url() -> String {
    "https://boardapi.realtor.ca".to_string()
}

fn default_token_url() -> String {
    "https://identity.crea.ca/connect/token".to_string()
}

fn default_page_size() -> u32 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            sync_interval_hours: default_sync_interval_hours(),
            region_filter: None,
            api_base_url: default_api_base_url(),
            token_url: default_token_url(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            database_path: None,
        }
    }
}

impl Config {
    /// Interval between incremental passes, never below one hour.
    pub fn effective_sync_interval_hours(&self) -> u32 {
        self.sync_interval_hours.max(1)
    }

    /// Region filter with surrounding whitespace removed; `None` when blank.
    pub fn region(&self) -> Option<String> {
        self.region_filter
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// A single brokerage office as cached in the local directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficeRecord {
    pub national_association_id: String,
    pub name: String,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state_or_province: Option<String>,
    pub postal_code: Option<String>,
    pub phone: Option<String>,
    /// Digits-only copy of `phone`; recomputed by the store on every write.
    pub phone_normalized: String,
    pub fax: Option<String>,
    pub email: Option<String>,
    /// First "Website" social-media entry, empty when there is none.
    pub website_url: String,
}

/// Strip every non-digit character from a phone number.
///
/// Example: "(555) 123-4567" → "5551234567"
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Office status as understood by the board API's `officeStatus` parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfficeStatus {
    #[default]
    Active,
    Inactive,
}

impl OfficeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfficeStatus::Active => "Active",
            OfficeStatus::Inactive => "Inactive",
        }
    }
}

/// Parameters for one paginated office fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfficeFilter {
    /// Only return offices modified at or after this ISO-8601 timestamp.
    pub since: Option<String>,
    pub status: OfficeStatus,
    pub region: Option<String>,
}

impl OfficeFilter {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn active_since(since: &str) -> Self {
        Self {
            since: Some(since.to_string()),
            ..Self::default()
        }
    }

    pub fn inactive_since(since: &str) -> Self {
        Self {
            since: Some(since.to_string()),
            status: OfficeStatus::Inactive,
            ..Self::default()
        }
    }
}

/// Result of a paginated fetch: enriched Firm records or bare delete candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedOffices {
    Active(Vec<OfficeRecord>),
    Inactive(Vec<String>),
}

impl FetchedOffices {
    pub fn len(&self) -> usize {
        match self {
            FetchedOffices::Active(records) => records.len(),
            FetchedOffices::Inactive(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Persisted sync boundaries, both ISO-8601 UTC strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWatermark {
    pub last_full_sync: String,
    pub last_incremental_sync: String,
}

impl Default for SyncWatermark {
    fn default() -> Self {
        Self {
            last_full_sync: EPOCH_WATERMARK.to_string(),
            last_incremental_sync: EPOCH_WATERMARK.to_string(),
        }
    }
}

impl SyncWatermark {
    /// True until a full pass has completed at least once.
    pub fn never_fully_synced(&self) -> bool {
        self.last_full_sync == EPOCH_WATERMARK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Full,
    Incremental,
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncKind::Full => write!(f, "full"),
            SyncKind::Incremental => write!(f, "incremental"),
        }
    }
}

/// Outcome of one pass, returned to the trigger and logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub kind: SyncKind,
    pub started_at: String,
    pub upserted: usize,
    pub deleted: usize,
    pub watermark_advanced: bool,
    /// Sub-actions that failed during an incremental pass, as log-ready messages.
    pub failures: Vec<String>,
}

impl SyncReport {
    pub fn new(kind: SyncKind, started_at: &str) -> Self {
        Self {
            kind,
            started_at: started_at.to_string(),
            upserted: 0,
            deleted: 0,
            watermark_advanced: false,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("(555) 123-4567"), "5551234567");
        assert_eq!(normalize_phone("+1 416.555.0100 ext 2"), "141655501002");
        assert_eq!(normalize_phone(""), "");
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sync_interval_hours, 24);
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_config_camel_case() {
        let json = r#"{
            "clientId": "id",
            "clientSecret": "secret",
            "syncIntervalHours": 6,
            "regionFilter": "Toronto"
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.client_id.as_deref(), Some("id"));
        assert_eq!(config.sync_interval_hours, 6);
        assert_eq!(config.region().as_deref(), Some("Toronto"));
    }

    #[test]
    fn test_effective_interval_has_floor() {
        let config = Config {
            sync_interval_hours: 0,
            ..Config::default()
        };
        assert_eq!(config.effective_sync_interval_hours(), 1);
    }

    #[test]
    fn test_blank_region_is_none() {
        let config = Config {
            region_filter: Some("   ".to_string()),
            ..Config::default()
        };
        assert!(config.region().is_none());
    }

    #[test]
    fn test_watermark_default_is_epoch() {
        let wm = SyncWatermark::default();
        assert_eq!(wm.last_full_sync, "1970-01-01T00:00:00Z");
        assert_eq!(wm.last_incremental_sync, "1970-01-01T00:00:00Z");
        assert!(wm.never_fully_synced());
    }
}
