// src/sync/scheduler.rs

//! Fixed-interval cycle scheduler.
//!
//! Each tick tries to take the single cycle permit. If the previous cycle
//! still holds it the tick is dropped: cycles never overlap and never queue.
//! A failed cycle is simply retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use log::Level;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::pipeline::{CycleError, CycleReport, Pipeline};
use crate::tagsync_log;

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    interval: Duration,
    guard: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, interval: Duration) -> Self {
        Self { pipeline, interval, guard: Arc::new(Semaphore::new(1)) }
    }

    pub fn is_cycle_running(&self) -> bool {
        self.guard.available_permits() == 0
    }

    /// Start a cycle unless one is already running. The returned task holds
    /// the permit until the cycle ends.
    pub fn try_start_cycle(&self) -> Option<JoinHandle<Result<CycleReport, CycleError>>> {
        let permit = Arc::clone(&self.guard).try_acquire_owned().ok()?;
        let pipeline = Arc::clone(&self.pipeline);
        Some(tokio::spawn(async move {
            let _permit = permit;
            let result = pipeline.run_cycle().await;
            if let Err(e) = &result {
                // Previous snapshot stays published; next tick retries.
                tagsync_log!(Level::Error, "scheduler", "Sync cycle failed: {}", e);
            }
            result
        }))
    }

    /// Tick until `shutdown` flips to true (or its sender goes away), then
    /// wait for an in-flight cycle to finish. The first tick fires at once.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tagsync_log!(Level::Info, "scheduler", "Scheduler started (interval={:?})", self.interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if self.try_start_cycle().is_none() {
                        tagsync_log!(Level::Warn, "scheduler", "Previous cycle still running, tick dropped");
                        metrics::counter!("tagsync_ticks_dropped_total").increment(1);
                    }
                }
            }
        }

        tagsync_log!(Level::Info, "scheduler", "Scheduler stopping");
        let _ = self.guard.acquire().await;
        tagsync_log!(Level::Info, "scheduler", "Scheduler stopped");
    }
}
