//! Upstream contact records as returned by the Wild Apricot `/contacts` endpoint.
//!
//! Only the parts the sync pipeline reads are modelled strictly; the rest of
//! the record is kept loosely typed and defaulted so upstream schema additions
//! never break deserialization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One contact from the directory. Never persisted as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Contact {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub membership_level: Option<MembershipLevelRef>,
    #[serde(default)]
    pub field_values: Vec<ContactField>,
}

/// `{"Id": 1234, "Name": "Full Member"}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MembershipLevelRef {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// One entry of a contact's ordered `FieldValues` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactField {
    pub field_name: String,
    #[serde(default)]
    pub value: FieldValue,
    #[serde(default)]
    pub system_code: String,
}

/// Runtime shape of a field value, decided only when the record is read.
///
/// Shapes are checked at the point of use; nothing is coerced.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldValue {
    /// JSON `null` or a missing `Value` key.
    #[default]
    Absent,
    Text(String),
    List(Vec<Value>),
    /// Numbers, booleans and bare objects.
    Other(Value),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Absent => "absent",
            FieldValue::Text(_) => "string",
            FieldValue::List(_) => "list",
            FieldValue::Other(Value::Number(_)) => "number",
            FieldValue::Other(Value::Bool(_)) => "bool",
            FieldValue::Other(Value::Object(_)) => "object",
            FieldValue::Other(_) => "other",
        }
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => FieldValue::Absent,
            Value::String(s) => FieldValue::Text(s),
            Value::Array(items) => FieldValue::List(items),
            other => FieldValue::Other(other),
        }
    }
}

impl From<FieldValue> for Value {
    fn from(v: FieldValue) -> Self {
        match v {
            FieldValue::Absent => Value::Null,
            FieldValue::Text(s) => Value::String(s),
            FieldValue::List(items) => Value::Array(items),
            FieldValue::Other(other) => other,
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Value::deserialize(d).map(FieldValue::from)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        Value::from(self.clone()).serialize(s)
    }
}

impl Contact {
    /// First field whose name matches exactly.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.field_values
            .iter()
            .find(|f| f.field_name == name)
            .map(|f| &f.value)
    }

    /// Name of the contact's membership level, if it has one.
    pub fn membership_level(&self) -> Option<&str> {
        self.membership_level
            .as_ref()
            .map(|l| l.name.as_str())
            .filter(|n| !n.is_empty())
    }
}

/// Envelope of `GET /accounts/{id}/contacts?$async=false`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactsResponse {
    #[serde(default)]
    pub contacts: Vec<Contact>,
}
