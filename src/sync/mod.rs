//! The sync pipeline: reconcile upstream contacts into the store, rebuild the
//! cache, and schedule it all on a fixed interval.

pub mod pipeline;
pub mod reconcile;
pub mod scheduler;

pub use pipeline::{CycleError, CycleReport, Pipeline};
pub use reconcile::{apply_batch, reconcile, ReconcileOptions, ReconcileReport};
pub use scheduler::Scheduler;
