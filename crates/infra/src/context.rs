//! Composition root
//!
//! Builds the concrete object graph for one user: SQLite store, OAuth token
//! clients, provider API clients, one adapter per provider, and the
//! [`SyncManager`] on top.

use std::sync::Arc;
use std::time::Duration;

use timeflow_core::{
    EventRepository, OAuthTokenClient, ProviderRepository, ProviderSync, ProviderSyncAdapter,
    RemoteCalendarClient, SyncManager, SyncManagerOptions, TokenProvider, TokenSource,
};
use timeflow_domain::{Config, ProviderKind, Result, TimeFlowError};
use tracing::info;

use crate::database::{DbManager, SqliteEventRepository, SqliteProviderRepository};
use crate::integrations::calendar::{
    GoogleCalendarClient, HttpOAuthClient, MicrosoftCalendarClient, OAuthSettings,
};

/// Remote API roots and token endpoints, overridable for test servers.
#[derive(Debug, Clone, Default)]
pub struct Endpoints {
    pub google_api: Option<String>,
    pub microsoft_api: Option<String>,
    pub google_token: Option<String>,
    pub microsoft_token: Option<String>,
}

/// Everything a running TimeFlow sync needs, wired together.
pub struct SyncContext {
    db: Arc<DbManager>,
    events: Arc<dyn EventRepository>,
    providers: Arc<dyn ProviderRepository>,
    tokens: Arc<TokenProvider>,
    manager: Arc<SyncManager>,
    auto_sync_interval_minutes: u64,
}

impl SyncContext {
    /// Open the database (running migrations) and wire the sync stack for
    /// `user_id`.
    pub fn build(config: &Config, user_id: &str) -> Result<Self> {
        Self::build_with_endpoints(config, user_id, &Endpoints::default())
    }

    pub fn build_with_endpoints(
        config: &Config,
        user_id: &str,
        endpoints: &Endpoints,
    ) -> Result<Self> {
        if user_id.trim().is_empty() {
            return Err(TimeFlowError::InvalidInput("user id must not be empty".into()));
        }

        let db = Arc::new(DbManager::new(&config.database.path, config.database.pool_size)?);
        db.run_migrations()?;

        let events: Arc<dyn EventRepository> = Arc::new(SqliteEventRepository::new(db.clone()));
        let providers: Arc<dyn ProviderRepository> =
            Arc::new(SqliteProviderRepository::new(db.clone()));

        let timeout = Duration::from_secs(config.sync.request_timeout_seconds.max(1));
        let mut tokens = TokenProvider::new(providers.clone());
        for kind in ProviderKind::ALL {
            let client_config = match kind {
                ProviderKind::Google => &config.google,
                ProviderKind::Microsoft => &config.microsoft,
            };
            let mut settings = OAuthSettings::for_provider(kind, client_config);
            let token_url = match kind {
                ProviderKind::Google => endpoints.google_token.as_ref(),
                ProviderKind::Microsoft => endpoints.microsoft_token.as_ref(),
            };
            if let Some(url) = token_url {
                settings = settings.with_token_url(url.clone());
            }
            let client: Arc<dyn OAuthTokenClient> =
                Arc::new(HttpOAuthClient::new(kind, settings, timeout)?);
            tokens = tokens.with_client(client);
        }
        let tokens = Arc::new(tokens);

        let mut google = GoogleCalendarClient::new(timeout)?;
        if let Some(url) = &endpoints.google_api {
            google = google.with_base_url(url.clone());
        }
        let mut microsoft = MicrosoftCalendarClient::new(timeout)?;
        if let Some(url) = &endpoints.microsoft_api {
            microsoft = microsoft.with_base_url(url.clone());
        }
        let remotes: [Arc<dyn RemoteCalendarClient>; 2] = [Arc::new(google), Arc::new(microsoft)];

        let mode = config.sync.mode();
        let token_source: Arc<dyn TokenSource> = tokens.clone();
        let adapters: Vec<Arc<dyn ProviderSync>> = remotes
            .into_iter()
            .map(|remote| {
                Arc::new(
                    ProviderSyncAdapter::new(
                        remote,
                        token_source.clone(),
                        events.clone(),
                        providers.clone(),
                    )
                    .with_mode(mode),
                ) as Arc<dyn ProviderSync>
            })
            .collect();

        let options = SyncManagerOptions {
            debounce: Duration::from_millis(config.sync.debounce_millis),
            ..SyncManagerOptions::default()
        };
        let manager = Arc::new(
            SyncManager::new(user_id, adapters, providers.clone(), events.clone())
                .with_options(options),
        );

        info!(
            user_id,
            ?mode,
            db_path = %db.path().display(),
            "sync context ready"
        );

        Ok(Self {
            db,
            events,
            providers,
            tokens,
            manager,
            auto_sync_interval_minutes: config.sync.auto_sync_interval_minutes,
        })
    }

    pub fn database(&self) -> &Arc<DbManager> {
        &self.db
    }

    pub fn events(&self) -> &Arc<dyn EventRepository> {
        &self.events
    }

    pub fn providers(&self) -> &Arc<dyn ProviderRepository> {
        &self.providers
    }

    /// Connection lifecycle (connect, disconnect, token refresh).
    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    pub fn manager(&self) -> &Arc<SyncManager> {
        &self.manager
    }

    /// Start auto-sync at the configured interval. Requires a Tokio runtime.
    pub fn start_auto_sync(&self) -> Result<()> {
        self.manager.start_auto_sync(self.auto_sync_interval_minutes)
    }

    /// Stop auto-sync and wait for the background task.
    pub async fn shutdown(&self) -> Result<()> {
        self.manager.shutdown().await
    }
}
