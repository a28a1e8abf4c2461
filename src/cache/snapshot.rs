//! Immutable cache snapshots and the single-slot channel that publishes them.
//!
//! The pipeline builds a complete [`CacheSnapshot`] and hands it to
//! [`CachePublisher::publish`], which swaps one `Arc` in a `watch` channel.
//! Readers clone that `Arc`; they never see a half-built view and never wait
//! on the pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;

/// tag_id → membership level (door readers).
pub type DoorCache = BTreeMap<u32, Option<String>>;

/// tag_id → completed trainings (machine readers). Known tags without
/// trainings map to an empty set.
pub type MachineCache = BTreeMap<u32, BTreeSet<String>>;

/// Door and machine views as of one store read, plus their serialized bodies.
#[derive(Debug)]
pub struct CacheSnapshot {
    generation: u64,
    built_at: DateTime<Utc>,
    door: DoorCache,
    machine: MachineCache,
    door_json: Vec<u8>,
    machine_json: Vec<u8>,
}

#[derive(Serialize)]
struct DoorEntry<'a> {
    tag_id: u32,
    membership_level: Option<&'a str>,
}

#[derive(Serialize)]
struct MachineEntry<'a> {
    tag_id: u32,
    trainings: &'a BTreeSet<String>,
}

impl CacheSnapshot {
    /// Freeze both views and serialize them once.
    pub fn new(
        generation: u64,
        built_at: DateTime<Utc>,
        door: DoorCache,
        machine: MachineCache,
    ) -> serde_json::Result<Self> {
        let door_json = serde_json::to_vec(
            &door
                .iter()
                .map(|(tag_id, level)| DoorEntry { tag_id: *tag_id, membership_level: level.as_deref() })
                .collect::<Vec<_>>(),
        )?;
        let machine_json = serde_json::to_vec(
            &machine
                .iter()
                .map(|(tag_id, trainings)| MachineEntry { tag_id: *tag_id, trainings })
                .collect::<Vec<_>>(),
        )?;
        Ok(Self { generation, built_at, door, machine, door_json, machine_json })
    }

    /// Number of published snapshots before this one, plus one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn door(&self) -> &DoorCache {
        &self.door
    }

    pub fn machine(&self) -> &MachineCache {
        &self.machine
    }

    /// `[{"tag_id":1023,"membership_level":"Full"}, ...]`, sorted by tag.
    pub fn door_json(&self) -> &[u8] {
        &self.door_json
    }

    /// `[{"tag_id":1023,"trainings":["Laser"]}, ...]`, sorted by tag.
    pub fn machine_json(&self) -> &[u8] {
        &self.machine_json
    }

    /// True when both views hold the same entries, whatever the metadata.
    pub fn same_views(&self, other: &CacheSnapshot) -> bool {
        self.door == other.door && self.machine == other.machine
    }
}

/// No sync cycle has completed yet. Readers must treat this as "unknown",
/// never as "nobody has access".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("access cache not yet available")]
pub struct CacheUnavailable;

/// Write side; owned by the sync pipeline.
#[derive(Debug)]
pub struct CachePublisher {
    tx: watch::Sender<Option<Arc<CacheSnapshot>>>,
}

/// Read side; cheap to clone into every request handler.
#[derive(Debug, Clone)]
pub struct CacheReader {
    rx: watch::Receiver<Option<Arc<CacheSnapshot>>>,
}

/// An empty slot and both of its ends.
pub fn cache_channel() -> (CachePublisher, CacheReader) {
    let (tx, rx) = watch::channel(None);
    (CachePublisher { tx }, CacheReader { rx })
}

impl CachePublisher {
    /// Replace the published snapshot. Returns the one it replaced.
    pub fn publish(&self, snapshot: CacheSnapshot) -> Option<Arc<CacheSnapshot>> {
        metrics::gauge!("tagsync_door_entries").set(snapshot.door.len() as f64);
        metrics::gauge!("tagsync_machine_entries").set(snapshot.machine.len() as f64);
        self.tx.send_replace(Some(Arc::new(snapshot)))
    }

    /// Generation the next snapshot should carry.
    pub fn next_generation(&self) -> u64 {
        self.tx.borrow().as_ref().map_or(1, |s| s.generation + 1)
    }

    pub fn reader(&self) -> CacheReader {
        CacheReader { rx: self.tx.subscribe() }
    }
}

impl CacheReader {
    /// The latest published snapshot.
    pub fn current(&self) -> Result<Arc<CacheSnapshot>, CacheUnavailable> {
        self.rx.borrow().clone().ok_or(CacheUnavailable)
    }

    /// Wait until a snapshot newer than the one last seen is published.
    /// Returns `None` once the publisher is gone.
    pub async fn next(&mut self) -> Option<Arc<CacheSnapshot>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}
