// src/db/connection.rs
//! Opening and initialising SQLite with runtime parameters.

use std::{path::Path, time::Duration};
use log::Level;
use rusqlite::Connection;
use crate::config::DatabaseConfig;
use crate::tagsync_log;

const SCHEMA: &str = include_str!("../../resources/schema.sql");

pub fn open_db_connection(path: &Path, cfg: &DatabaseConfig) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tagsync_log!(Level::Debug, "db", "journal_mode={} for {}", mode, path.display());
    conn.pragma_update(None, "synchronous", cfg.synchronous.as_str())?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

/// Open the store file and make sure the schema exists.
pub fn init_database(cfg: &DatabaseConfig) -> rusqlite::Result<Connection> {
    let conn = open_db_connection(&cfg.path, cfg)?;
    let limit: i64 = conn.pragma_update_and_check(None, "journal_size_limit", cfg.journal_size_limit as i64, |row| row.get(0))?;
    tagsync_log!(Level::Debug, "db", "journal_size_limit={}", limit);
    apply_schema(&conn)?;
    tagsync_log!(Level::Info, "db", "Database ready at {}", cfg.path.display());
    Ok(conn)
}

/// Private in-memory database with the schema applied.
pub fn init_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", true)?;
    apply_schema(&conn)?;
    Ok(conn)
}

fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
