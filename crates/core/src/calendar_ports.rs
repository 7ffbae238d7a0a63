//! Calendar integration port interfaces
//!
//! Implemented per provider in `timeflow-infra`. Every implementation bounds
//! its network calls in time and reports failures as typed [`SyncError`]s;
//! transport errors never escape raw.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use timeflow_domain::{
    AuthorizationCode, Event, ProviderKind, RemoteEventEntry, SyncError, TokenGrant,
};

/// Thin wrapper over a provider's event API.
#[async_trait]
pub trait RemoteCalendarClient: Send + Sync {
    /// Provider this client talks to.
    fn provider(&self) -> ProviderKind;

    /// Fetch every event instance intersecting `[start, end]`.
    ///
    /// Recurring series are expanded into single instances. Items that cannot
    /// be parsed are returned in place as `Err` entries so callers can report
    /// them and keep going.
    async fn fetch_events(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEventEntry>, SyncError>;

    /// Create `event` remotely and return the provider's id for it.
    async fn create_event(&self, access_token: &str, event: &Event) -> Result<String, SyncError>;

    /// Overwrite the remote event `remote_id` with the local fields of `event`.
    async fn update_event(
        &self,
        access_token: &str,
        remote_id: &str,
        event: &Event,
    ) -> Result<(), SyncError>;

    /// Delete the remote event. Already-deleted events count as success.
    async fn delete_event(&self, access_token: &str, remote_id: &str) -> Result<(), SyncError>;
}

/// OAuth token endpoint of one provider.
#[async_trait]
pub trait OAuthTokenClient: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Exchange an authorization code from the consent callback.
    async fn exchange_authorization_code(
        &self,
        code: &AuthorizationCode,
    ) -> Result<TokenGrant, SyncError>;

    /// Refresh an access token.
    ///
    /// Fails with [`SyncError::InvalidGrant`] when the provider reports the
    /// grant revoked, [`SyncError::RefreshFailed`] otherwise.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, SyncError>;
}
