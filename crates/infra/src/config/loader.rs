//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file into the process environment, if one exists
//! 2. Attempts to load from environment variables
//! 3. If incomplete, falls back to loading from file
//! 4. Probes multiple paths for config files (JSON and TOML)
//!
//! ## Environment Variables
//! - `TIMEFLOW_DB_PATH`: Database file path (required)
//! - `TIMEFLOW_DB_POOL_SIZE`: Connection pool size (default 4)
//! - `TIMEFLOW_GOOGLE_CLIENT_ID` / `TIMEFLOW_GOOGLE_CLIENT_SECRET`
//! - `TIMEFLOW_MICROSOFT_CLIENT_ID` / `TIMEFLOW_MICROSOFT_CLIENT_SECRET`
//! - `TIMEFLOW_SYNC_INTERVAL_MINUTES`: Auto-sync interval (default 5)
//! - `TIMEFLOW_SYNC_REQUEST_TIMEOUT`: Remote call timeout in seconds (default 30)
//! - `TIMEFLOW_SYNC_DEBOUNCE_MS`: Edit-triggered sync debounce (default 1000)
//! - `TIMEFLOW_SYNC_EXPORT_ENABLED`: Push local changes to providers (default false)
//!
//! Client ids are required; secrets are optional for public PKCE clients.
//!
//! ## File Locations
//! The loader probes `config.{json,toml}` and `timeflow.{json,toml}` in the
//! current directory, its two parents, and next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use timeflow_domain::{
    Config, DatabaseConfig, OAuthClientConfig, Result, SyncSettings, TimeFlowError,
};

const DEFAULT_POOL_SIZE: u32 = 4;
const CONFIG_FILE_NAMES: [&str; 4] =
    ["config.json", "config.toml", "timeflow.json", "timeflow.toml"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `TimeFlowError::Config` if neither the environment nor any config
/// file yields a complete, valid configuration.
pub fn load() -> Result<Config> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env file");
    }

    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `TimeFlowError::Config` if required variables are missing or any
/// variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let defaults = SyncSettings::default();

    let database = DatabaseConfig {
        path: env_var("TIMEFLOW_DB_PATH")?,
        pool_size: env_parse("TIMEFLOW_DB_POOL_SIZE", DEFAULT_POOL_SIZE)?,
    };
    let google = OAuthClientConfig {
        client_id: env_var("TIMEFLOW_GOOGLE_CLIENT_ID")?,
        client_secret: env_optional("TIMEFLOW_GOOGLE_CLIENT_SECRET"),
    };
    let microsoft = OAuthClientConfig {
        client_id: env_var("TIMEFLOW_MICROSOFT_CLIENT_ID")?,
        client_secret: env_optional("TIMEFLOW_MICROSOFT_CLIENT_SECRET"),
    };
    let sync = SyncSettings {
        auto_sync_interval_minutes: env_parse(
            "TIMEFLOW_SYNC_INTERVAL_MINUTES",
            defaults.auto_sync_interval_minutes,
        )?,
        request_timeout_seconds: env_parse(
            "TIMEFLOW_SYNC_REQUEST_TIMEOUT",
            defaults.request_timeout_seconds,
        )?,
        debounce_millis: env_parse("TIMEFLOW_SYNC_DEBOUNCE_MS", defaults.debounce_millis)?,
        export_enabled: env_bool("TIMEFLOW_SYNC_EXPORT_ENABLED", defaults.export_enabled),
    };

    Ok(Config { database, google, microsoft, sync })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations (see
/// [`probe_config_paths`]). Format is chosen by file extension.
///
/// # Errors
/// Returns `TimeFlowError::Config` if the file is missing, unreadable, or
/// invalid.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TimeFlowError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            TimeFlowError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TimeFlowError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TimeFlowError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TimeFlowError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(TimeFlowError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join("..")]);
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            TimeFlowError::Config(format!("Missing required environment variable: {}", key))
        })
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_optional(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| TimeFlowError::Config(format!("Invalid value for {}: {}", key, e))),
        None => Ok(default),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
