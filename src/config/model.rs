// src/config/model.rs

use serde::Deserialize;
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use thiserror::Error;

/// Top-level runtime config
#[derive(Debug, Clone)]
pub struct Config {
    pub logging:  LoggingConfig,
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub fields:   FieldNames,
    pub sync:     SyncConfig,
    pub server:   ServerConfig,
}

/// Mirror of the whole TOML file before durations and addresses are parsed.
#[derive(Debug, Deserialize)]
pub struct RawConfig {
    #[serde(default)] pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub upstream: RawUpstreamConfig,
    pub fields:   FieldNames,
    #[serde(default)] pub sync:   RawSyncConfig,
    #[serde(default)] pub server: RawServerConfig,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]            pub enable: bool,
    #[serde(default)]            pub file:   Option<String>,
    #[serde(default = "default_level")] pub level: String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// Mirror of the `[database]` table. Only `path` is mandatory.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_synchronous")]
    pub synchronous: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_journal_size_limit")]
    pub journal_size_limit: u64,
}
fn default_synchronous() -> String { "NORMAL".into() }
fn default_busy_timeout_ms() -> u64 { 1_000 }
fn default_journal_size_limit() -> u64 { 50_000_000 }

impl DatabaseConfig {
    /// Config for a database file at `path` with every other knob defaulted.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            synchronous: default_synchronous(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_size_limit: default_journal_size_limit(),
        }
    }
}

/// Raw `[upstream]` table
#[derive(Debug, Deserialize)]
pub struct RawUpstreamConfig {
    pub account_id: u64,
    pub api_key:    String,
    #[serde(default = "default_api_base")] pub api_base: String,
    #[serde(default = "default_auth_url")] pub auth_url: String,
    #[serde(default)]                      pub timeout:  Option<String>,
}
fn default_api_base() -> String { "https://api.wildapricot.org/v2.2".into() }
fn default_auth_url() -> String { "https://oauth.wildapricot.org/auth/token".into() }

/// Fully-typed upstream settings
#[derive(Clone)]
pub struct UpstreamConfig {
    pub account_id: u64,
    pub api_key:    String,
    pub api_base:   String,
    pub auth_url:   String,
    pub timeout:    Duration,
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("account_id", &self.account_id)
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("auth_url", &self.auth_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Maps the logical fields we read to their upstream field names.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldNames {
    pub tag_id:   String,
    pub training: String,
}

/// Raw `[sync]` table
#[derive(Debug, Default, Deserialize)]
pub struct RawSyncConfig {
    #[serde(default)] pub interval: Option<String>,
    #[serde(default)] pub prune_missing_contacts: bool,
}

/// Fully-typed sync settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
    pub prune_missing_contacts: bool,
}

/// Raw `[server]` table
#[derive(Debug, Default, Deserialize)]
pub struct RawServerConfig {
    #[serde(default)] pub listen: Option<String>,
    #[serde(default)] pub metrics_listen: Option<String>,
}

/// Fully-typed server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub metrics_listen: Option<SocketAddr>,
}

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(6 * 60);
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("invalid listen address '{0}': {1}")]
    InvalidAddress(String, #[source] std::net::AddrParseError),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("sync interval must be greater than zero")]
    ZeroInterval,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}
