//! Derives the door and machine views from the store.

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::Connection;
use thiserror::Error;

use super::snapshot::{CacheSnapshot, DoorCache, MachineCache};
use crate::db::{Store, StoreContents};

/// The store did not read back as a consistent whole. Cycle-scoped.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("reading store: {0}")]
    Read(#[from] rusqlite::Error),

    #[error("training link ({tag_id}, '{training}') points at a tag no member holds")]
    OrphanLink { tag_id: u32, training: String },

    #[error("serializing snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Read the whole store in one transaction and freeze it into a snapshot.
pub fn build_snapshot(store: &mut Store, generation: u64) -> Result<CacheSnapshot, BuildError> {
    let contents = store.read_contents()?;
    build_from_contents(contents, generation)
}

/// Build from whatever `conn` currently sees, including uncommitted writes
/// of an open transaction.
pub fn build_snapshot_in(conn: &Connection, generation: u64) -> Result<CacheSnapshot, BuildError> {
    build_from_contents(Store::contents_in(conn)?, generation)
}

/// Pure half of [`build_snapshot`].
pub fn build_from_contents(contents: StoreContents, generation: u64) -> Result<CacheSnapshot, BuildError> {
    let mut door = DoorCache::new();
    let mut machine = MachineCache::new();

    for member in contents.members.into_iter().filter(|m| m.tag_id != 0) {
        machine.entry(member.tag_id).or_insert_with(BTreeSet::new);
        // Members sharing a tag: the lowest contact id wins, which keeps
        // the view stable across rebuilds.
        door.entry(member.tag_id).or_insert(member.membership_level);
    }

    for link in contents.links {
        match machine.get_mut(&link.tag_id) {
            Some(trainings) => {
                trainings.insert(link.training_name);
            }
            None => {
                return Err(BuildError::OrphanLink { tag_id: link.tag_id, training: link.training_name });
            }
        }
    }

    Ok(CacheSnapshot::new(generation, Utc::now(), door, machine)?)
}
