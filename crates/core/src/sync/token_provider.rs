//! Access-token lifecycle for connected providers

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use timeflow_domain::constants::TOKEN_REFRESH_BUFFER_SECS;
use timeflow_domain::{
    AuthorizationCode, CalendarProvider, ProviderConnection, ProviderKind, SyncError,
};
use tracing::{debug, info, instrument, warn};

use super::ports::{ProviderRepository, TokenSource};
use crate::calendar_ports::OAuthTokenClient;

/// Produces valid access tokens, refreshing and persisting them as needed.
pub struct TokenProvider {
    providers: Arc<dyn ProviderRepository>,
    clients: HashMap<ProviderKind, Arc<dyn OAuthTokenClient>>,
    refresh_buffer: Duration,
}

impl TokenProvider {
    pub fn new(providers: Arc<dyn ProviderRepository>) -> Self {
        Self {
            providers,
            clients: HashMap::new(),
            refresh_buffer: Duration::seconds(TOKEN_REFRESH_BUFFER_SECS),
        }
    }

    /// Register the token endpoint client for its provider.
    pub fn with_client(mut self, client: Arc<dyn OAuthTokenClient>) -> Self {
        self.clients.insert(client.provider(), client);
        self
    }

    /// Connect a provider: exchange the authorization code and upsert the
    /// connection as active.
    #[instrument(skip(self, code), fields(provider = %provider))]
    pub async fn connect(
        &self,
        user_id: &str,
        provider: ProviderKind,
        code: &AuthorizationCode,
        email: Option<String>,
    ) -> Result<CalendarProvider, SyncError> {
        let client = self.client(provider)?;
        let grant = client.exchange_authorization_code(code).await?;

        let connection = ProviderConnection {
            user_id: user_id.to_string(),
            provider,
            email,
            token_expires_at: grant.expires_at(Utc::now()),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
        };
        let row = self.providers.upsert_connection(&connection).await?;

        info!(user_id, "calendar provider connected");
        Ok(row)
    }

    /// Soft-delete the connection.
    #[instrument(skip(self), fields(provider = %provider))]
    pub async fn disconnect(&self, user_id: &str, provider: ProviderKind) -> Result<(), SyncError> {
        self.providers.deactivate(user_id, provider).await?;
        info!(user_id, "calendar provider disconnected");
        Ok(())
    }

    pub async fn is_connected(
        &self,
        user_id: &str,
        provider: ProviderKind,
    ) -> Result<bool, SyncError> {
        Ok(self.providers.find_active(user_id, provider).await?.is_some())
    }

    fn client(&self, provider: ProviderKind) -> Result<&Arc<dyn OAuthTokenClient>, SyncError> {
        self.clients.get(&provider).ok_or_else(|| SyncError::TokenUnavailable {
            provider,
            message: "no OAuth client configured".to_string(),
        })
    }

    async fn refresh(&self, row: &CalendarProvider) -> Result<String, SyncError> {
        let provider = row.provider;
        let Some(refresh_token) = row.refresh_token.as_deref() else {
            return Err(SyncError::NoRefreshToken { provider });
        };
        let client = self.client(provider)?;

        let grant = match client.refresh_token(refresh_token).await {
            Ok(grant) => grant,
            Err(err @ SyncError::InvalidGrant { .. }) => {
                warn!(
                    provider = %provider,
                    user_id = %row.user_id,
                    error = %err,
                    "grant revoked, deactivating provider"
                );
                if let Err(deactivate_err) =
                    self.providers.deactivate(&row.user_id, provider).await
                {
                    warn!(
                        provider = %provider,
                        error = %deactivate_err,
                        "failed to deactivate provider"
                    );
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let expires_at = grant.expires_at(Utc::now());
        let refresh_token = grant.refresh_token.as_deref().or(Some(refresh_token));
        self.providers
            .update_tokens(&row.user_id, provider, &grant.access_token, refresh_token, expires_at)
            .await
            .map_err(|err| SyncError::RefreshFailed {
                provider,
                message: format!("failed to persist refreshed token: {err}"),
            })?;

        debug!(provider = %provider, user_id = %row.user_id, %expires_at, "access token refreshed");
        Ok(grant.access_token)
    }
}

#[async_trait]
impl TokenSource for TokenProvider {
    #[instrument(skip(self), fields(provider = %provider))]
    async fn get_valid_token(
        &self,
        user_id: &str,
        provider: ProviderKind,
    ) -> Result<Option<String>, SyncError> {
        let Some(row) = self.providers.find_active(user_id, provider).await? else {
            return Ok(None);
        };
        // A row without an access token is still connected; the refresh
        // token can mint one.
        match row.access_token.as_deref() {
            Some(access_token) if row.token_valid_beyond(Utc::now(), self.refresh_buffer) => {
                return Ok(Some(access_token.to_string()));
            }
            _ => {}
        }

        self.refresh(&row).await.map(Some)
    }
}
