//! Pulls the tag id and training labels out of a contact's field list.

use crate::config::FieldNames;
use crate::contact::model::{Contact, FieldValue};
use serde_json::Value;
use thiserror::Error;

/// A contact whose configured fields do not have the expected shape.
/// Contact-scoped: the pipeline skips that contact and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("contact {contact_id}: tag id field '{field}' is a {found}, expected a string")]
    TagNotText { contact_id: i64, field: String, found: &'static str },

    #[error("contact {contact_id}: tag id '{value}' is not a number")]
    TagNotNumeric { contact_id: i64, value: String },

    #[error("contact {contact_id}: tag id {value} is non-positive")]
    TagNonPositive { contact_id: i64, value: i64 },

    #[error("contact {contact_id}: training field '{field}' is a {found}, expected a list")]
    TrainingNotList { contact_id: i64, field: String, found: &'static str },

    #[error("contact {contact_id}: training item #{index} is not a record")]
    TrainingItemNotRecord { contact_id: i64, index: usize },

    #[error("contact {contact_id}: training item #{index} has no string Label")]
    TrainingLabelMissing { contact_id: i64, index: usize },
}

impl ExtractionError {
    pub fn contact_id(&self) -> i64 {
        match self {
            ExtractionError::TagNotText { contact_id, .. }
            | ExtractionError::TagNotNumeric { contact_id, .. }
            | ExtractionError::TagNonPositive { contact_id, .. }
            | ExtractionError::TrainingNotList { contact_id, .. }
            | ExtractionError::TrainingItemNotRecord { contact_id, .. }
            | ExtractionError::TrainingLabelMissing { contact_id, .. } => *contact_id,
        }
    }
}

/// Everything the reconciler needs from one contact.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactData {
    pub contact_id: i64,
    /// 0 means no card issued.
    pub tag_id: u32,
    pub membership_level: Option<String>,
    /// Kept apart from the tag id so a broken training field does not hide a
    /// valid tag; the caller decides what to do with it.
    pub trainings: Result<Vec<String>, ExtractionError>,
}

impl Contact {
    /// Tag id from the configured field; 0 when the field is missing or blank.
    pub fn extract_tag_id(&self, fields: &FieldNames) -> Result<u32, ExtractionError> {
        match self.field(&fields.tag_id) {
            None | Some(FieldValue::Absent) => Ok(0),
            Some(FieldValue::Text(s)) => parse_tag_id(self.id, s),
            Some(other) => Err(ExtractionError::TagNotText {
                contact_id: self.id,
                field: fields.tag_id.clone(),
                found: other.kind(),
            }),
        }
    }

    /// Training labels in upstream order. All-or-nothing: one bad item
    /// discards the whole set.
    pub fn extract_training_labels(&self, fields: &FieldNames) -> Result<Vec<String>, ExtractionError> {
        match self.field(&fields.training) {
            None | Some(FieldValue::Absent) => Ok(Vec::new()),
            Some(FieldValue::List(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| label_of(self.id, index, item))
                .collect(),
            Some(other) => Err(ExtractionError::TrainingNotList {
                contact_id: self.id,
                field: fields.training.clone(),
                found: other.kind(),
            }),
        }
    }

    /// Tag errors fail the whole extraction; training errors ride along in
    /// [`ContactData::trainings`].
    pub fn extract_contact_data(&self, fields: &FieldNames) -> Result<ContactData, ExtractionError> {
        let tag_id = self.extract_tag_id(fields)?;
        Ok(ContactData {
            contact_id: self.id,
            tag_id,
            membership_level: self.membership_level().map(str::to_owned),
            trainings: self.extract_training_labels(fields),
        })
    }
}

fn parse_tag_id(contact_id: i64, s: &str) -> Result<u32, ExtractionError> {
    if s.is_empty() {
        return Ok(0);
    }
    // Tags are issued as 32-bit signed values upstream.
    let value: i32 = s.parse().map_err(|_| ExtractionError::TagNotNumeric {
        contact_id,
        value: s.to_owned(),
    })?;
    if value <= 0 {
        return Err(ExtractionError::TagNonPositive { contact_id, value: value.into() });
    }
    Ok(value as u32)
}

fn label_of(contact_id: i64, index: usize, item: &Value) -> Result<String, ExtractionError> {
    let record = item
        .as_object()
        .ok_or(ExtractionError::TrainingItemNotRecord { contact_id, index })?;
    record
        .get("Label")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(ExtractionError::TrainingLabelMissing { contact_id, index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::model::ContactField;
    use serde_json::json;

    fn names() -> FieldNames {
        FieldNames { tag_id: "RFID Tag".into(), training: "Safety Training".into() }
    }

    fn contact(fields: Vec<(&str, Value)>) -> Contact {
        Contact {
            id: 42,
            field_values: fields
                .into_iter()
                .map(|(name, v)| ContactField {
                    field_name: name.into(),
                    value: v.into(),
                    system_code: String::new(),
                })
                .collect(),
            ..Contact::default()
        }
    }

    #[test]
    fn numeric_tag_is_parsed() {
        let c = contact(vec![("RFID Tag", json!("1023"))]);
        assert_eq!(c.extract_tag_id(&names()), Ok(1023));
    }

    #[test]
    fn blank_missing_and_null_tags_are_unassigned() {
        assert_eq!(contact(vec![("RFID Tag", json!(""))]).extract_tag_id(&names()), Ok(0));
        assert_eq!(contact(vec![]).extract_tag_id(&names()), Ok(0));
        assert_eq!(contact(vec![("RFID Tag", Value::Null)]).extract_tag_id(&names()), Ok(0));
    }

    #[test]
    fn negative_and_zero_tags_are_rejected() {
        let err = contact(vec![("RFID Tag", json!("-5"))]).extract_tag_id(&names()).unwrap_err();
        assert_eq!(err, ExtractionError::TagNonPositive { contact_id: 42, value: -5 });

        let err = contact(vec![("RFID Tag", json!("0"))]).extract_tag_id(&names()).unwrap_err();
        assert!(matches!(err, ExtractionError::TagNonPositive { value: 0, .. }));
    }

    #[test]
    fn malformed_tags_are_rejected() {
        for raw in ["abc", " 12", "12.5", "99999999999"] {
            let err = contact(vec![("RFID Tag", json!(raw))]).extract_tag_id(&names()).unwrap_err();
            assert!(matches!(err, ExtractionError::TagNotNumeric { .. }), "{raw}: {err}");
        }
    }

    #[test]
    fn non_string_tag_is_rejected() {
        let err = contact(vec![("RFID Tag", json!(1023))]).extract_tag_id(&names()).unwrap_err();
        assert!(matches!(err, ExtractionError::TagNotText { found: "number", .. }));
    }

    #[test]
    fn training_labels_keep_order() {
        let c = contact(vec![(
            "Safety Training",
            json!([{"Id": 1, "Label": "Laser"}, {"Id": 2, "Label": "WoodShop"}]),
        )]);
        assert_eq!(c.extract_training_labels(&names()), Ok(vec!["Laser".into(), "WoodShop".into()]));
    }

    #[test]
    fn missing_training_field_is_empty() {
        assert_eq!(contact(vec![]).extract_training_labels(&names()), Ok(vec![]));
        assert_eq!(contact(vec![("Safety Training", Value::Null)]).extract_training_labels(&names()), Ok(vec![]));
    }

    #[test]
    fn one_bad_training_item_discards_all() {
        let c = contact(vec![("Safety Training", json!([{"Label": "Laser"}, "WoodShop"]))]);
        assert_eq!(
            c.extract_training_labels(&names()),
            Err(ExtractionError::TrainingItemNotRecord { contact_id: 42, index: 1 })
        );

        let c = contact(vec![("Safety Training", json!([{"Label": "Laser"}, {"Label": 3}]))]);
        assert_eq!(
            c.extract_training_labels(&names()),
            Err(ExtractionError::TrainingLabelMissing { contact_id: 42, index: 1 })
        );
    }

    #[test]
    fn training_field_must_be_a_list() {
        let c = contact(vec![("Safety Training", json!("Laser"))]);
        assert!(matches!(
            c.extract_training_labels(&names()),
            Err(ExtractionError::TrainingNotList { found: "string", .. })
        ));
    }

    #[test]
    fn contact_data_carries_training_error_next_to_tag() {
        let c = contact(vec![
            ("RFID Tag", json!("77")),
            ("Safety Training", json!({"Label": "Laser"})),
        ]);
        let data = c.extract_contact_data(&names()).unwrap();
        assert_eq!(data.contact_id, 42);
        assert_eq!(data.tag_id, 77);
        assert!(data.trainings.is_err());
    }

    #[test]
    fn contact_data_fails_on_bad_tag() {
        let c = contact(vec![("RFID Tag", json!("-5")), ("Safety Training", json!([]))]);
        let err = c.extract_contact_data(&names()).unwrap_err();
        assert_eq!(err.contact_id(), 42);
    }
}
