//! Recurring incremental passes.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::SyncOrchestrator;
use crate::scheduler::{ScheduleHandle, ScheduledTask, Scheduler};

struct Armed {
    handle: ScheduleHandle,
    hours: u32,
}

/// Owns the single recurring registration that drives incremental syncs.
///
/// Arm, reschedule and disarm all happen under one lock, so there is never
/// more than one live registration and a reschedule cannot double-fire.
pub struct IncrementalSchedule {
    scheduler: Arc<dyn Scheduler>,
    orchestrator: Arc<SyncOrchestrator>,
    armed: Mutex<Option<Armed>>,
}

impl IncrementalSchedule {
    pub fn new(scheduler: Arc<dyn Scheduler>, orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            scheduler,
            orchestrator,
            armed: Mutex::new(None),
        }
    }

    /// Register the recurring pass. Returns false if one is already armed.
    pub fn arm(&self, hours: u32) -> bool {
        let mut armed = self.armed.lock();
        if armed.is_some() {
            return false;
        }
        *armed = Some(self.register(hours));
        true
    }

    /// Replace the registration with one at the new interval, measured from now.
    /// Arms the schedule if it was not armed.
    pub fn reschedule(&self, hours: u32) {
        let mut armed = self.armed.lock();
        if let Some(previous) = armed.take() {
            self.scheduler.cancel(previous.handle);
        }
        *armed = Some(self.register(hours));
    }

    /// Remove the registration. Returns false if nothing was armed.
    pub fn disarm(&self) -> bool {
        match self.armed.lock().take() {
            Some(previous) => {
                self.scheduler.cancel(previous.handle);
                log::info!("Incremental sync schedule disarmed");
                true
            }
            None => false,
        }
    }

    pub fn interval_hours(&self) -> Option<u32> {
        self.armed.lock().as_ref().map(|a| a.hours)
    }

    fn register(&self, hours: u32) -> Armed {
        let hours = hours.max(1);
        let orchestrator = self.orchestrator.clone();
        let task: ScheduledTask = Arc::new(move || {
            let orchestrator = orchestrator.clone();
            Box::pin(async move {
                log::debug!("Incremental sync: scheduled tick");
                // Failures are already logged by the orchestrator.
                let _ = orchestrator.try_run_scheduled_incremental().await;
            })
        });

        let handle = self
            .scheduler
            .every(Duration::from_secs(u64::from(hours) * 3600), task);
        log::info!("Incremental sync scheduled every {} hour(s)", hours);
        Armed { handle, hours }
    }
}
