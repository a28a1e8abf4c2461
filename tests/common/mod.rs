//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use tagsync::cache::cache_channel;
use tagsync::config::FieldNames;
use tagsync::contact::{Contact, ContactField, MembershipLevelRef};
use tagsync::db::Store;
use tagsync::sync::{Pipeline, ReconcileOptions};
use tagsync::upstream::{ContactSource, FetchError};

pub fn names() -> FieldNames {
    FieldNames { tag_id: "RFID Tag".into(), training: "Safety Training".into() }
}

/// `["Laser", "WoodShop"]` → `[{"Label": "Laser"}, {"Label": "WoodShop"}]`
pub fn labels(names: &[&str]) -> Value {
    Value::Array(names.iter().map(|n| json!({"Id": 1, "Label": n})).collect())
}

/// A contact with the tag and training fields set, plus a decoy field.
pub fn contact(id: i64, tag: Value, trainings: Value) -> Contact {
    Contact {
        id,
        display_name: format!("Member {id}"),
        status: "Active".into(),
        membership_level: Some(MembershipLevelRef { id: 1, name: "Full".into() }),
        field_values: vec![
            field("Email", json!(format!("m{id}@example.org"))),
            field("RFID Tag", tag),
            field("Safety Training", trainings),
        ],
        ..Contact::default()
    }
}

pub fn field(name: &str, value: Value) -> ContactField {
    ContactField { field_name: name.into(), value: value.into(), system_code: String::new() }
}

/// In-memory directory whose answers the test controls.
#[derive(Default)]
pub struct FakeSource {
    contacts: Mutex<Vec<Contact>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_contacts(contacts: Vec<Contact>) -> Arc<Self> {
        let source = Self::default();
        source.set_contacts(contacts);
        Arc::new(source)
    }

    pub fn set_contacts(&self, contacts: Vec<Contact>) {
        *self.contacts.lock().unwrap() = contacts;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContactSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_contacts(&self) -> Result<Vec<Contact>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Other("directory unreachable".into()));
        }
        Ok(self.contacts.lock().unwrap().clone())
    }
}

/// Pipeline over an in-memory store and `source`.
pub fn pipeline(source: Arc<FakeSource>, fetch_timeout: Duration) -> Pipeline {
    let (publisher, _reader) = cache_channel();
    Pipeline::new(
        source,
        Store::open_in_memory().unwrap(),
        publisher,
        names(),
        ReconcileOptions::default(),
        fetch_timeout,
    )
}
