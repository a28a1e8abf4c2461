// src/db/store.rs
//! The local system of record: members, trainings and their links.
//!
//! A `Store` owns its connection. The sync pipeline is its only writer; the
//! HTTP side never touches it and reads published snapshots instead.

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use super::{connection, PersistenceError};
use crate::config::DatabaseConfig;

/// One row of `members`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRow {
    pub contact_id: i64,
    pub tag_id: u32,
    pub membership_level: Option<String>,
}

/// One row of `membership_trainings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRow {
    pub tag_id: u32,
    pub training_name: String,
}

/// Members and links read inside a single transaction.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StoreContents {
    pub members: Vec<MemberRow>,
    pub links: Vec<LinkRow>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(cfg: &DatabaseConfig) -> Result<Self, PersistenceError> {
        Ok(Self { conn: connection::init_database(cfg)? })
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Ok(Self { conn: connection::init_in_memory()? })
    }

    /// Immediate write transaction; dropped without commit it rolls back.
    pub fn write_transaction(&mut self) -> rusqlite::Result<Transaction<'_>> {
        self.conn.transaction_with_behavior(TransactionBehavior::Immediate)
    }

    /// Members and links as of one consistent point in time.
    pub fn read_contents(&mut self) -> rusqlite::Result<StoreContents> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let contents = Self::contents_in(&tx)?;
        tx.commit()?;
        Ok(contents)
    }

    /// Members and links as seen by `conn`, typically an open transaction
    /// whose writes are not committed yet.
    pub fn contents_in(conn: &Connection) -> rusqlite::Result<StoreContents> {
        let members = {
            let mut stmt = conn.prepare_cached(
                "SELECT contact_id, tag_id, membership_level FROM members ORDER BY contact_id",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok(MemberRow { contact_id: r.get(0)?, tag_id: r.get(1)?, membership_level: r.get(2)? })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let links = {
            let mut stmt = conn.prepare_cached(
                "SELECT tag_id, training_name FROM membership_trainings ORDER BY tag_id, training_name",
            )?;
            let rows = stmt.query_map([], |r| Ok(LinkRow { tag_id: r.get(0)?, training_name: r.get(1)? }))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(StoreContents { members, links })
    }

    pub fn member(&self, contact_id: i64) -> rusqlite::Result<Option<MemberRow>> {
        self.conn
            .query_row(
                "SELECT contact_id, tag_id, membership_level FROM members WHERE contact_id = ?1",
                params![contact_id],
                |r| Ok(MemberRow { contact_id: r.get(0)?, tag_id: r.get(1)?, membership_level: r.get(2)? }),
            )
            .optional()
    }

    /// Training names linked to `tag_id`, sorted.
    pub fn trainings_for(&self, tag_id: u32) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT training_name FROM membership_trainings WHERE tag_id = ?1 ORDER BY training_name",
        )?;
        let rows = stmt.query_map(params![tag_id], |r| r.get(0))?;
        rows.collect()
    }

    /// Every known training, referenced or not.
    pub fn training_names(&self) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached("SELECT name FROM trainings ORDER BY name")?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        rows.collect()
    }

    pub fn member_count(&self) -> rusqlite::Result<i64> {
        self.conn.query_row("SELECT COUNT(*) FROM members", [], |r| r.get(0))
    }

    /// Fold the WAL back into the main file.
    pub fn checkpoint(&self) -> rusqlite::Result<()> {
        self.conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
    }

    /// Raw connection, for tests and ad-hoc inspection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
