//! Where contact lists come from.

pub mod wild_apricot;

use async_trait::async_trait;
use thiserror::Error;

use crate::contact::Contact;

pub use wild_apricot::WildApricotClient;

/// The directory could not be read. Cycle-scoped: nothing is written and the
/// next tick retries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream rejected {what}: {status} {body}")]
    Rejected { what: &'static str, status: u16, body: String },

    #[error("upstream did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("{0}")]
    Other(String),
}

/// A full snapshot of the directory's contacts for one account.
#[async_trait]
pub trait ContactSource: Send + Sync + 'static {
    /// Display name for logs.
    fn name(&self) -> &'static str;

    async fn fetch_contacts(&self) -> Result<Vec<Contact>, FetchError>;
}
