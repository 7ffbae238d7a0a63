#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tempfile::TempDir;
use timeflow_domain::{
    Config, DatabaseConfig, OAuthClientConfig, ProviderConnection, ProviderKind, SyncSettings,
};
use timeflow_infra::database::DbManager;

/// Temporary database directory that stays alive for the duration of a test.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a migrated database in a fresh temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let manager = DbManager::new(temp_dir.path().join("test.db"), 4)
            .expect("db manager should be created");
        manager.run_migrations().expect("migrations should run");

        Self { manager: Arc::new(manager), temp_dir }
    }

    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().join("test.db")
    }

    /// Configuration pointing at this database file.
    pub fn config(&self, export_enabled: bool) -> Config {
        Config {
            database: DatabaseConfig { path: self.path().display().to_string(), pool_size: 4 },
            google: OAuthClientConfig {
                client_id: "google-client".into(),
                client_secret: Some("google-secret".into()),
            },
            microsoft: OAuthClientConfig {
                client_id: "microsoft-client".into(),
                client_secret: None,
            },
            sync: SyncSettings {
                request_timeout_seconds: 5,
                debounce_millis: 50,
                export_enabled,
                ..SyncSettings::default()
            },
        }
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn connection(
    user_id: &str,
    provider: ProviderKind,
    token_expires_at: DateTime<Utc>,
) -> ProviderConnection {
    ProviderConnection {
        user_id: user_id.into(),
        provider,
        email: Some(format!("{user_id}@example.com")),
        access_token: "stale-access".into(),
        refresh_token: Some("stored-refresh".into()),
        token_expires_at,
    }
}

/// A Google API event item starting `days` from now.
pub fn google_item(id: &str, title: &str, days: i64, updated: DateTime<Utc>) -> serde_json::Value {
    let start = Utc::now() + Duration::days(days);
    let end = start + Duration::hours(1);
    serde_json::json!({
        "id": id,
        "summary": title,
        "start": {"dateTime": start.to_rfc3339()},
        "end": {"dateTime": end.to_rfc3339()},
        "updated": updated.to_rfc3339(),
    })
}
