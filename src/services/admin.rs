//! Administrative actions: manual syncs, clearing, status, settings.

use serde::{Deserialize, Serialize};

use crate::db::OfficeStore;
use crate::error::{ConfigError, SyncError};
use crate::state::DirectoryState;
use crate::types::{Config, SyncReport};

/// Run a full pass now, waiting for any pass already in flight.
pub async fn trigger_full_sync(state: &DirectoryState) -> Result<SyncReport, SyncError> {
    log::info!("Full sync requested");
    state.orchestrator().run_full_sync().await
}

/// Run an incremental pass now, waiting for any pass already in flight.
pub async fn trigger_incremental_sync(state: &DirectoryState) -> Result<SyncReport, SyncError> {
    log::info!("Incremental sync requested");
    state.orchestrator().run_incremental_sync().await
}

/// Delete every stored office. Watermarks are kept.
pub async fn clear_all_data(state: &DirectoryState) -> Result<usize, SyncError> {
    state.orchestrator().clear_store().await
}

pub fn record_count(state: &DirectoryState) -> Result<usize, SyncError> {
    Ok(state.store().count_offices()?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub record_count: usize,
    pub last_full_sync: String,
    pub last_incremental_sync: String,
    pub sync_interval_hours: u32,
    pub schedule_armed: bool,
    pub sync_running: bool,
    pub credentials_configured: bool,
}

pub fn sync_status(state: &DirectoryState) -> Result<SyncStatus, SyncError> {
    let config = state.config();
    let watermark = state.orchestrator().watermark()?;
    Ok(SyncStatus {
        record_count: record_count(state)?,
        last_full_sync: watermark.last_full_sync,
        last_incremental_sync: watermark.last_incremental_sync,
        sync_interval_hours: config.effective_sync_interval_hours(),
        schedule_armed: state.schedule().interval_hours().is_some(),
        sync_running: state.orchestrator().is_running(),
        credentials_configured: has_text(&config.client_id) && has_text(&config.client_secret),
    })
}

/// Settings change request. `None` leaves a field untouched; blank text clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub sync_interval_hours: Option<u32>,
    pub region_filter: Option<String>,
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn sanitize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Validate, persist and apply a settings change.
///
/// The API client is rebuilt when credentials or region change. The
/// incremental schedule is re-armed only when the interval actually changed
/// and the schedule is armed.
pub async fn update_settings(
    state: &DirectoryState,
    update: SettingsUpdate,
) -> Result<Config, SyncError> {
    if update.sync_interval_hours == Some(0) {
        return Err(ConfigError::Invalid("syncIntervalHours must be at least 1".to_string()).into());
    }

    let (previous, updated) = state.update_config(|config| {
        if let Some(id) = update.client_id.as_deref() {
            config.client_id = sanitize(id);
        }
        if let Some(secret) = update.client_secret.as_deref() {
            config.client_secret = sanitize(secret);
        }
        if let Some(hours) = update.sync_interval_hours {
            config.sync_interval_hours = hours;
        }
        if let Some(region) = update.region_filter.as_deref() {
            config.region_filter = sanitize(region);
        }
    })?;

    let connection_changed = previous.client_id != updated.client_id
        || previous.client_secret != updated.client_secret
        || previous.region() != updated.region();
    if connection_changed {
        state.rebuild_source(&updated)?;
    }

    let hours = updated.effective_sync_interval_hours();
    if previous.effective_sync_interval_hours() != hours
        && state.schedule().interval_hours().is_some()
    {
        state.schedule().reschedule(hours);
    }

    log::info!("Settings updated");
    Ok(updated)
}
