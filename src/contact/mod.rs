//! Upstream contact records and the field extractor that reads them.

pub mod extract;
pub mod model;

pub use extract::{ContactData, ExtractionError};
pub use model::{Contact, ContactField, ContactsResponse, FieldValue, MembershipLevelRef};
