//! Read-optimized access views and their publication.

pub mod builder;
pub mod snapshot;

pub use builder::{build_snapshot, build_snapshot_in, BuildError};
pub use snapshot::{cache_channel, CachePublisher, CacheReader, CacheSnapshot, CacheUnavailable, DoorCache, MachineCache};
