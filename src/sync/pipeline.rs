//! One sync cycle: fetch, reconcile, build, publish.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::Level;
use thiserror::Error;

use super::reconcile::{apply_batch, ReconcileOptions, ReconcileReport};
use crate::cache::{build_snapshot_in, BuildError, CachePublisher, CacheReader, CacheSnapshot};
use crate::config::FieldNames;
use crate::db::{PersistenceError, Store};
use crate::tagsync_log;
use crate::upstream::{ContactSource, FetchError};

/// Why a cycle ended without publishing. Every variant leaves the store and
/// the published snapshot as they were.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("store update failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("cache build failed: {0}")]
    Build(#[from] BuildError),

    #[error("cycle worker died: {0}")]
    Worker(String),
}

impl CycleError {
    fn outcome(&self) -> &'static str {
        match self {
            CycleError::Fetch(_) => "fetch_error",
            CycleError::Persistence(_) => "persistence_error",
            CycleError::Build(_) => "build_error",
            CycleError::Worker(_) => "worker_error",
        }
    }
}

/// What a successful cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub reconcile: ReconcileReport,
    pub generation: u64,
    pub door_entries: usize,
    pub machine_entries: usize,
    pub elapsed: Duration,
}

/// Sole writer of the store and sole publisher of snapshots.
pub struct Pipeline {
    source: Arc<dyn ContactSource>,
    store: Arc<Mutex<Store>>,
    publisher: CachePublisher,
    fields: FieldNames,
    options: ReconcileOptions,
    fetch_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn ContactSource>,
        store: Store,
        publisher: CachePublisher,
        fields: FieldNames,
        options: ReconcileOptions,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            store: Arc::new(Mutex::new(store)),
            publisher,
            fields,
            options,
            fetch_timeout,
        }
    }

    pub fn reader(&self) -> CacheReader {
        self.publisher.reader()
    }

    /// Run `f` against the store; for inspection outside a cycle.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut store)
    }

    /// Run one full cycle. Callers must not run two at once; the scheduler's
    /// guard takes care of that.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let result = self.cycle(started).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };
        metrics::counter!("tagsync_cycles_total", "outcome" => outcome).increment(1);
        metrics::histogram!("tagsync_cycle_duration_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    async fn cycle(&self, started: Instant) -> Result<CycleReport, CycleError> {
        tagsync_log!(Level::Info, "pipeline", "Fetching contacts from {}", self.source.name());
        let contacts = tokio::time::timeout(self.fetch_timeout, self.source.fetch_contacts())
            .await
            .map_err(|_| FetchError::Timeout(self.fetch_timeout))??;

        let generation = self.publisher.next_generation();
        let store = Arc::clone(&self.store);
        let fields = self.fields.clone();
        let options = self.options;

        let (reconcile_report, snapshot) = tokio::task::spawn_blocking(
            move || -> Result<(ReconcileReport, CacheSnapshot), CycleError> {
                let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
                // Build from the uncommitted batch: a build failure rolls the
                // writes back together with everything else.
                let tx = store.write_transaction().map_err(PersistenceError::from)?;
                let report = apply_batch(&tx, &contacts, &fields, &options)?;
                let snapshot = build_snapshot_in(&tx, generation)?;
                tx.commit().map_err(PersistenceError::from)?;

                if let Err(e) = store.checkpoint() {
                    tagsync_log!(Level::Warn, "pipeline", "WAL checkpoint failed: {}", e);
                }
                Ok((report, snapshot))
            },
        )
        .await
        .map_err(|e| CycleError::Worker(e.to_string()))??;

        let report = CycleReport {
            reconcile: reconcile_report,
            generation: snapshot.generation(),
            door_entries: snapshot.door().len(),
            machine_entries: snapshot.machine().len(),
            elapsed: started.elapsed(),
        };
        self.publisher.publish(snapshot);
        tagsync_log!(
            Level::Info,
            "pipeline",
            "Published cache generation {} ({} door, {} machine entries) in {:?}",
            report.generation,
            report.door_entries,
            report.machine_entries,
            report.elapsed
        );
        Ok(report)
    }
}
