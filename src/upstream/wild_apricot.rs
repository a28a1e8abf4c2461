//! Wild Apricot API client.
//!
//! Every fetch exchanges the API key for a short-lived bearer token, then
//! reads the account's contacts synchronously (`$async=false`).

use async_trait::async_trait;
use log::Level;
use reqwest::{Client, Response};
use serde::Deserialize;

use super::{ContactSource, FetchError};
use crate::config::UpstreamConfig;
use crate::contact::{Contact, ContactsResponse};
use crate::tagsync_log;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct WildApricotClient {
    client: Client,
    cfg: UpstreamConfig,
}

impl WildApricotClient {
    /// Build a client whose every request is bounded by `cfg.timeout`.
    pub fn new(cfg: UpstreamConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self { client, cfg })
    }

    fn contacts_url(&self) -> String {
        format!("{}/accounts/{}/contacts", self.cfg.api_base, self.cfg.account_id)
    }

    async fn access_token(&self) -> Result<String, FetchError> {
        let response = self
            .client
            .post(&self.cfg.auth_url)
            .basic_auth("APIKEY", Some(&self.cfg.api_key))
            .form(&[("grant_type", "client_credentials"), ("scope", "auto")])
            .send()
            .await?;
        let token: TokenResponse = ensure_success("token request", response).await?.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl ContactSource for WildApricotClient {
    fn name(&self) -> &'static str {
        "wild_apricot"
    }

    async fn fetch_contacts(&self) -> Result<Vec<Contact>, FetchError> {
        let token = self.access_token().await?;
        tagsync_log!(Level::Debug, "upstream", "Fetching contacts for account {}", self.cfg.account_id);

        let response = self
            .client
            .get(self.contacts_url())
            .bearer_auth(token)
            .header("Accept", "application/json")
            .query(&[("$async", "false")])
            .send()
            .await?;
        let body: ContactsResponse = ensure_success("contacts request", response).await?.json().await?;

        tagsync_log!(Level::Debug, "upstream", "Received {} contact(s)", body.contacts.len());
        Ok(body.contacts)
    }
}

impl std::fmt::Debug for WildApricotClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WildApricotClient").field("cfg", &self.cfg).finish()
    }
}

async fn ensure_success(what: &'static str, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(FetchError::Rejected { what, status: status.as_u16(), body })
}
