//! Recurring timer abstraction for sync triggers
//!
//! The orchestrator never talks to tokio timers directly; it is handed a
//! `Scheduler` so tests and embedders can substitute their own. The tokio
//! implementation:
//! - Fires first after one full period, then every period
//! - Skips ticks missed while the process was suspended
//! - Spawns each firing as its own task, so cancelling the timer never
//!   aborts a pass that is already running

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Future produced by one timer firing.
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Work run on every firing.
pub type ScheduledTask = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Opaque handle identifying one recurring registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleHandle(u64);

pub trait Scheduler: Send + Sync {
    /// Run `task` every `period` until cancelled.
    fn every(&self, period: Duration, task: ScheduledTask) -> ScheduleHandle;

    /// Stop future firings. Returns false if the handle was unknown.
    fn cancel(&self, handle: ScheduleHandle) -> bool;
}

/// Scheduler backed by tokio interval timers. Must be used inside a runtime.
#[derive(Default)]
pub struct TokioScheduler {
    next_id: AtomicU64,
    timers: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registrations currently armed.
    pub fn active_count(&self) -> usize {
        self.timers.lock().len()
    }
}

impl Scheduler for TokioScheduler {
    fn every(&self, period: Duration, task: ScheduledTask) -> ScheduleHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // Measured from registration, not from when the timer task first runs.
        let start = tokio::time::Instant::now() + period;

        let timer = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tokio::spawn(task());
            }
        });

        self.timers.lock().insert(id, timer);
        ScheduleHandle(id)
    }

    fn cancel(&self, handle: ScheduleHandle) -> bool {
        match self.timers.lock().remove(&handle.0) {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.abort();
        }
    }
}
