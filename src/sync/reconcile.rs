//! Brings the store in line with one fetched contact list.
//!
//! The whole batch is applied in a single write transaction, so a failure
//! anywhere leaves the store exactly as it was before the cycle.

use std::collections::HashSet;

use log::Level;
use rusqlite::{params, OptionalExtension, Transaction};

use crate::config::FieldNames;
use crate::contact::{Contact, ContactData, ExtractionError};
use crate::db::{PersistenceError, Store};
use crate::tagsync_log;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Delete members whose contact no longer appears upstream.
    pub prune_missing_contacts: bool,
}

/// What one reconcile pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub contacts_seen: usize,
    /// Contacts with a blank or missing tag; nothing written for them.
    pub unassigned: usize,
    pub members_written: usize,
    pub links_written: usize,
    /// Previous tags whose links were dropped after their holder moved on.
    pub stale_tags_cleared: usize,
    pub members_pruned: usize,
    /// Contacts skipped because their tag id could not be read.
    pub extraction_failures: Vec<ExtractionError>,
    /// Contacts written without touching their links.
    pub training_failures: Vec<ExtractionError>,
}

/// Apply `contacts` to `store` and commit. Contact-scoped extraction problems
/// are logged and recorded in the report; only SQLite errors fail the call.
pub fn reconcile(
    store: &mut Store,
    contacts: &[Contact],
    fields: &FieldNames,
    options: &ReconcileOptions,
) -> Result<ReconcileReport, PersistenceError> {
    let tx = store.write_transaction()?;
    let report = apply_batch(&tx, contacts, fields, options)?;
    tx.commit()?;
    Ok(report)
}

/// Apply `contacts` inside `tx` without committing, so the caller can do
/// more work under the same transaction.
pub fn apply_batch(
    tx: &Transaction<'_>,
    contacts: &[Contact],
    fields: &FieldNames,
    options: &ReconcileOptions,
) -> Result<ReconcileReport, PersistenceError> {
    let mut report = ReconcileReport::default();

    for contact in contacts {
        report.contacts_seen += 1;

        let data = match contact.extract_contact_data(fields) {
            Ok(data) => data,
            Err(e) => {
                tagsync_log!(Level::Warn, "reconcile", "Skipping contact: {}", e);
                metrics::counter!("tagsync_extraction_failures_total", "field" => "tag_id").increment(1);
                report.extraction_failures.push(e);
                continue;
            }
        };

        if data.tag_id == 0 {
            tagsync_log!(Level::Trace, "reconcile", "Contact {} has no tag", data.contact_id);
            report.unassigned += 1;
            continue;
        }

        apply_contact(tx, &data, &mut report)?;
    }

    if options.prune_missing_contacts {
        prune_missing(tx, contacts, &mut report)?;
    }

    tagsync_log!(
        Level::Info,
        "reconcile",
        "Reconciled {} contact(s): {} written, {} unassigned, {} skipped, {} training failure(s), {} pruned",
        report.contacts_seen,
        report.members_written,
        report.unassigned,
        report.extraction_failures.len(),
        report.training_failures.len(),
        report.members_pruned
    );
    Ok(report)
}

fn apply_contact(
    tx: &Transaction<'_>,
    data: &ContactData,
    report: &mut ReconcileReport,
) -> rusqlite::Result<()> {
    let previous_tag: Option<u32> = tx
        .query_row(
            "SELECT tag_id FROM members WHERE contact_id = ?1",
            params![data.contact_id],
            |r| r.get(0),
        )
        .optional()?;

    tx.execute(
        "INSERT INTO members (contact_id, tag_id, membership_level) VALUES (?1, ?2, ?3) \
         ON CONFLICT (contact_id) DO UPDATE SET \
             tag_id = excluded.tag_id, membership_level = excluded.membership_level",
        params![data.contact_id, data.tag_id, data.membership_level],
    )?;
    report.members_written += 1;

    if let Some(old) = previous_tag.filter(|old| *old != 0 && *old != data.tag_id) {
        tagsync_log!(Level::Info, "reconcile", "Contact {} moved from tag {} to {}",
            data.contact_id, old, data.tag_id);
        if data.trainings.is_err() {
            carry_links(tx, old, data.tag_id)?;
        }
        if clear_unheld_tag(tx, old)? > 0 {
            report.stale_tags_cleared += 1;
        }
    }

    match &data.trainings {
        Ok(labels) => report.links_written += replace_links(tx, data.tag_id, labels)?,
        Err(e) => {
            // Links keep their last successfully reconciled state.
            tagsync_log!(Level::Warn, "reconcile", "Keeping previous trainings for tag {}: {}",
                data.tag_id, e);
            metrics::counter!("tagsync_extraction_failures_total", "field" => "training").increment(1);
            report.training_failures.push(e.clone());
        }
    }
    Ok(())
}

/// Replace every link of `tag_id` with `labels`. Returns the number of links.
fn replace_links(tx: &Transaction<'_>, tag_id: u32, labels: &[String]) -> rusqlite::Result<usize> {
    tx.execute("DELETE FROM membership_trainings WHERE tag_id = ?1", params![tag_id])?;

    let mut add_training = tx.prepare_cached("INSERT OR IGNORE INTO trainings (name) VALUES (?1)")?;
    let mut add_link = tx.prepare_cached(
        "INSERT OR IGNORE INTO membership_trainings (tag_id, training_name) VALUES (?1, ?2)",
    )?;
    let mut written = 0;
    for label in labels {
        add_training.execute(params![label])?;
        written += add_link.execute(params![tag_id, label])?;
    }
    Ok(written)
}

/// Copy the links of `from` onto `to`.
fn carry_links(tx: &Transaction<'_>, from: u32, to: u32) -> rusqlite::Result<usize> {
    tx.execute(
        "INSERT OR IGNORE INTO membership_trainings (tag_id, training_name) \
         SELECT ?2, training_name FROM membership_trainings WHERE tag_id = ?1",
        params![from, to],
    )
}

/// Drop the links of `tag_id` if no member holds it any more.
fn clear_unheld_tag(tx: &Transaction<'_>, tag_id: u32) -> rusqlite::Result<usize> {
    tx.execute(
        "DELETE FROM membership_trainings WHERE tag_id = ?1 \
         AND NOT EXISTS (SELECT 1 FROM members WHERE tag_id = ?1)",
        params![tag_id],
    )
}

fn prune_missing(
    tx: &Transaction<'_>,
    contacts: &[Contact],
    report: &mut ReconcileReport,
) -> rusqlite::Result<()> {
    let upstream: HashSet<i64> = contacts.iter().map(|c| c.id).collect();

    let gone: Vec<(i64, u32)> = {
        let mut stmt = tx.prepare_cached("SELECT contact_id, tag_id FROM members")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, u32>(1)?)))?;
        rows.filter(|row| row.as_ref().map_or(true, |(id, _)| !upstream.contains(id)))
            .collect::<rusqlite::Result<_>>()?
    };

    for (contact_id, tag_id) in gone {
        tx.execute("DELETE FROM members WHERE contact_id = ?1", params![contact_id])?;
        clear_unheld_tag(tx, tag_id)?;
        tagsync_log!(Level::Info, "reconcile", "Pruned contact {} (tag {}) missing upstream",
            contact_id, tag_id);
        report.members_pruned += 1;
    }
    Ok(())
}
