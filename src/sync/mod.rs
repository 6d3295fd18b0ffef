//! Full and incremental reconciliation of the office directory.
//!
//! Both pass types go through one async gate, so a scheduled incremental
//! pass and an administrative full pass never interleave their writes.
//! Watermarks are written as the last step of a pass and carry the time the
//! pass *started*, so records modified while pages were being fetched are
//! picked up again by the next incremental pass.

pub mod schedule;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};

use crate::board_api::{FetchError, OfficeSource};
use crate::db::OfficeStore;
use crate::error::SyncError;
use crate::types::{
    FetchedOffices, OfficeFilter, OfficeRecord, SyncKind, SyncReport, SyncWatermark,
    WATERMARK_FORMAT,
};

pub use schedule::IncrementalSchedule;

/// Source of "now" for watermarks; injectable for tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct SyncOrchestrator {
    store: Arc<dyn OfficeStore>,
    source: RwLock<Arc<dyn OfficeSource>>,
    gate: Mutex<()>,
    shutdown: watch::Sender<bool>,
    clock: Clock,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn OfficeStore>, source: Arc<dyn OfficeSource>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            source: RwLock::new(source),
            gate: Mutex::new(()),
            shutdown,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn OfficeStore> {
        &self.store
    }

    /// Swap the API source, e.g. after credentials change. Takes effect on the next pass.
    pub fn replace_source(&self, source: Arc<dyn OfficeSource>) {
        *self.source.write() = source;
    }

    /// True while a pass (or an exclusive store action) holds the gate.
    pub fn is_running(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Abort any in-flight pass and refuse new ones.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn watermark(&self) -> Result<SyncWatermark, SyncError> {
        Ok(self.store.load_watermark()?)
    }

    fn now_watermark(&self) -> String {
        (self.clock)().format(WATERMARK_FORMAT).to_string()
    }

    fn current_source(&self) -> Arc<dyn OfficeSource> {
        self.source.read().clone()
    }

    /// Run `fut` unless shutdown is (or becomes) requested first.
    async fn cancellable<T>(
        &self,
        fut: impl Future<Output = Result<T, SyncError>>,
    ) -> Result<T, SyncError> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(SyncError::Cancelled);
        }
        tokio::select! {
            res = fut => res,
            _ = shutdown.wait_for(|stop| *stop) => Err(SyncError::Cancelled),
        }
    }

    /// Fetch all Active Firm offices and upsert them. Never deletes.
    pub async fn run_full_sync(&self) -> Result<SyncReport, SyncError> {
        let _gate = self.gate.lock().await;
        self.cancellable(self.full_pass())
            .await
            .inspect_err(|e| log_pass_failure(SyncKind::Full, e))
    }

    /// Apply changes since the incremental watermark: upsert updated Firms, delete Inactive ids.
    pub async fn run_incremental_sync(&self) -> Result<SyncReport, SyncError> {
        let _gate = self.gate.lock().await;
        self.cancellable(self.incremental_pass())
            .await
            .inspect_err(|e| log_pass_failure(SyncKind::Incremental, e))
    }

    /// Timer entry point: skips the tick instead of queueing when a pass is in flight.
    pub async fn try_run_scheduled_incremental(&self) -> Option<Result<SyncReport, SyncError>> {
        let Ok(_gate) = self.gate.try_lock() else {
            log::info!("Incremental sync: previous pass still running, skipping scheduled run");
            return None;
        };
        Some(
            self.cancellable(self.incremental_pass())
                .await
                .inspect_err(|e| log_pass_failure(SyncKind::Incremental, e)),
        )
    }

    /// Remove every stored office, waiting for any running pass to finish first.
    pub async fn clear_store(&self) -> Result<usize, SyncError> {
        let _gate = self.gate.lock().await;
        let removed = self.store.clear_offices()?;
        log::info!("Office directory cleared ({} row(s) removed)", removed);
        Ok(removed)
    }

    async fn full_pass(&self) -> Result<SyncReport, SyncError> {
        let started_at = self.now_watermark();
        let mut report = SyncReport::new(SyncKind::Full, &started_at);
        log::info!("Full sync: starting (pass start {})", started_at);

        let source = self.current_source();
        let records = fetch_active(source.as_ref(), &OfficeFilter::active()).await?;
        log::info!("Full sync: fetched {} Firm office(s)", records.len());

        report.upserted = self.store.upsert_offices(&records)?;
        self.store.set_last_full_sync(&started_at)?;
        report.watermark_advanced = true;

        log::info!(
            "Full sync: completed, {} office(s) saved, watermark {}",
            report.upserted,
            started_at
        );
        Ok(report)
    }

    async fn incremental_pass(&self) -> Result<SyncReport, SyncError> {
        let started_at = self.now_watermark();
        let mut report = SyncReport::new(SyncKind::Incremental, &started_at);
        let since = self.store.load_watermark()?.last_incremental_sync;
        log::info!(
            "Incremental sync: starting (pass start {}, changes since {})",
            started_at,
            since
        );

        let source = self.current_source();
        let mut fetch_failures: Vec<FetchError> = Vec::new();

        match fetch_active(source.as_ref(), &OfficeFilter::active_since(&since)).await {
            Ok(records) => {
                report.upserted = self.store.upsert_offices(&records)?;
                log::info!("Incremental sync: {} updated office(s) saved", report.upserted);
            }
            Err(FetchError::Auth(e)) => return Err(SyncError::Auth(e)),
            Err(e) => {
                log::warn!(
                    "Incremental sync: updated offices skipped (pass start {}): {}",
                    started_at,
                    e
                );
                report.failures.push(format!("updated offices: {}", e));
                fetch_failures.push(e);
            }
        }

        match fetch_inactive(source.as_ref(), &OfficeFilter::inactive_since(&since)).await {
            Ok(ids) => {
                report.deleted = self.store.delete_offices(&ids)?;
                log::info!(
                    "Incremental sync: {} inactive id(s) reported, {} office(s) removed",
                    ids.len(),
                    report.deleted
                );
            }
            Err(FetchError::Auth(e)) => return Err(SyncError::Auth(e)),
            Err(e) => {
                log::warn!(
                    "Incremental sync: inactive offices skipped (pass start {}): {}",
                    started_at,
                    e
                );
                report.failures.push(format!("inactive offices: {}", e));
                fetch_failures.push(e);
            }
        }

        if fetch_failures.len() == 2 {
            return Err(fetch_failures.remove(0).into());
        }

        if report.is_clean() {
            self.store.set_last_incremental_sync(&started_at)?;
            report.watermark_advanced = true;
            log::info!("Incremental sync: completed, watermark {}", started_at);
        } else {
            log::warn!(
                "Incremental sync: completed with {} failed sub-action(s); watermark held at {}",
                report.failures.len(),
                since
            );
        }

        Ok(report)
    }
}

fn log_pass_failure(kind: SyncKind, err: &SyncError) {
    match err {
        SyncError::Cancelled => log::warn!("{} sync: cancelled, watermark unchanged", kind),
        other => log::error!(
            "{} sync failed: {} ({})",
            kind,
            other,
            other.recovery_suggestion()
        ),
    }
}

async fn fetch_active(
    source: &dyn OfficeSource,
    filter: &OfficeFilter,
) -> Result<Vec<OfficeRecord>, FetchError> {
    match source.fetch_offices(filter).await? {
        FetchedOffices::Active(records) => Ok(records),
        FetchedOffices::Inactive(_) => Err(FetchError::UnexpectedShape(
            "inactive batch returned for an active fetch".to_string(),
        )),
    }
}

async fn fetch_inactive(
    source: &dyn OfficeSource,
    filter: &OfficeFilter,
) -> Result<Vec<String>, FetchError> {
    match source.fetch_offices(filter).await? {
        FetchedOffices::Inactive(ids) => Ok(ids),
        FetchedOffices::Active(_) => Err(FetchError::UnexpectedShape(
            "active batch returned for an inactive fetch".to_string(),
        )),
    }
}
