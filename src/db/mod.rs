// src/db/mod.rs
//! SQLite-backed store: connection setup plus the member/training tables.

pub mod connection;
pub mod store;

use thiserror::Error;

pub use store::{LinkRow, MemberRow, Store, StoreContents};

/// A write to the store failed. Cycle-scoped: the transaction is rolled back
/// and the previous snapshot stays published.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),
}
