// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

mod macros;

pub mod cache;
pub mod config;
pub mod contact;
pub mod db;
pub mod server;
pub mod sync;
pub mod upstream;
