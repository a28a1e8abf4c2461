// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads the TOML file, deserializes it into `RawConfig`, and converts the
//! raw tables into the typed runtime `Config`.

use crate::config::model::{
    Config, ConfigError, RawConfig, RawServerConfig, RawSyncConfig, RawUpstreamConfig,
    ServerConfig, SyncConfig, UpstreamConfig, DEFAULT_LISTEN, DEFAULT_SYNC_INTERVAL,
    DEFAULT_UPSTREAM_TIMEOUT,
};
use crate::tagsync_log;
use log::Level;
use std::{fs, net::SocketAddr, path::Path, time::Duration};

/// Load and parse the configuration from `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    tagsync_log!(Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = parse(&txt)?;
    tagsync_log!(Level::Info, "config", "Loaded config from {:?}", path);
    Ok(cfg)
}

/// Parse configuration text. Split out from `load` so tests need no files.
pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(txt)?;

    if raw.fields.tag_id.trim().is_empty() {
        return Err(ConfigError::Empty("fields.tag_id"));
    }
    if raw.fields.training.trim().is_empty() {
        return Err(ConfigError::Empty("fields.training"));
    }

    Ok(Config {
        logging:  raw.logging,
        database: raw.database,
        upstream: convert_upstream(raw.upstream)?,
        fields:   raw.fields,
        sync:     convert_sync(raw.sync)?,
        server:   convert_server(raw.server)?,
    })
}

fn convert_upstream(raw: RawUpstreamConfig) -> Result<UpstreamConfig, ConfigError> {
    if raw.api_key.is_empty() {
        return Err(ConfigError::Empty("upstream.api_key"));
    }
    let timeout = parse_duration(raw.timeout.as_deref())?.unwrap_or(DEFAULT_UPSTREAM_TIMEOUT);
    Ok(UpstreamConfig {
        account_id: raw.account_id,
        api_key: raw.api_key,
        api_base: raw.api_base.trim_end_matches('/').to_owned(),
        auth_url: raw.auth_url,
        timeout,
    })
}

fn convert_sync(raw: RawSyncConfig) -> Result<SyncConfig, ConfigError> {
    let interval = parse_duration(raw.interval.as_deref())?.unwrap_or(DEFAULT_SYNC_INTERVAL);
    if interval.is_zero() {
        return Err(ConfigError::ZeroInterval);
    }
    tagsync_log!(Level::Debug, "config", "Sync interval={:?}, prune_missing_contacts={}",
        interval, raw.prune_missing_contacts);
    Ok(SyncConfig { interval, prune_missing_contacts: raw.prune_missing_contacts })
}

fn convert_server(raw: RawServerConfig) -> Result<ServerConfig, ConfigError> {
    let listen = parse_addr(raw.listen.as_deref().unwrap_or(DEFAULT_LISTEN))?;
    let metrics_listen = raw.metrics_listen.as_deref().map(parse_addr).transpose()?;
    Ok(ServerConfig { listen, metrics_listen })
}

/// `"6m"`, `"90s"`, `"1h 30m"` → `Duration`
fn parse_duration(s: Option<&str>) -> Result<Option<Duration>, ConfigError> {
    s.map(|s| humantime::parse_duration(s).map_err(|e| ConfigError::InvalidDuration(s.into(), e)))
        .transpose()
}

fn parse_addr(s: &str) -> Result<SocketAddr, ConfigError> {
    s.parse().map_err(|e| ConfigError::InvalidAddress(s.into(), e))
}
