//! Configuration structures
//!
//! Loaded by `timeflow-infra::config` from the environment or a TOML/JSON file.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_AUTO_SYNC_INTERVAL_MINUTES, DEFAULT_DEBOUNCE_MS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::types::SyncMode;

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub google: OAuthClientConfig,
    pub microsoft: OAuthClientConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Local event store location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// OAuth client registration for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    /// Public (PKCE-only) clients have no secret.
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Sync scheduling and remote call bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_auto_sync_interval")]
    pub auto_sync_interval_minutes: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_debounce")]
    pub debounce_millis: u64,
    /// Pushing local changes to providers is off unless explicitly enabled.
    #[serde(default)]
    pub export_enabled: bool,
}

impl SyncSettings {
    pub fn mode(&self) -> SyncMode {
        if self.export_enabled {
            SyncMode::Bidirectional
        } else {
            SyncMode::ImportOnly
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            auto_sync_interval_minutes: default_auto_sync_interval(),
            request_timeout_seconds: default_request_timeout(),
            debounce_millis: default_debounce(),
            export_enabled: false,
        }
    }
}

fn default_pool_size() -> u32 {
    4
}

fn default_auto_sync_interval() -> u64 {
    DEFAULT_AUTO_SYNC_INTERVAL_MINUTES
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_debounce() -> u64 {
    DEFAULT_DEBOUNCE_MS
}
