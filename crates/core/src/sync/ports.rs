//! Port interfaces for sync operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use timeflow_domain::{
    CalendarProvider, Event, EventPatch, NewEvent, ProviderConnection, ProviderKind,
    ProviderSyncReport, Result, SyncError,
};

/// Local event store.
///
/// Each call commits on its own; nothing spans more than one event. The store
/// stamps `updated_at` on content writes (insert, remote update) but not on
/// sync bookkeeping (flags, remote-id links).
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Get a single event
    async fn find_event(&self, event_id: &str) -> Result<Option<Event>>;

    /// All events of `user_id` linked to `provider` (remote id present)
    async fn find_linked_events(&self, user_id: &str, provider: ProviderKind)
        -> Result<Vec<Event>>;

    /// Events starting inside `[start, end]` that are unlinked or unsynced for
    /// `provider`
    async fn find_pending_export(
        &self,
        user_id: &str,
        provider: ProviderKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    /// Insert an event and return it with its assigned id and timestamp
    async fn insert_event(&self, event: &NewEvent) -> Result<Event>;

    /// Overwrite content fields from the remote version and mark the event
    /// synced for `provider`
    async fn apply_remote_update(
        &self,
        event_id: &str,
        provider: ProviderKind,
        patch: &EventPatch,
    ) -> Result<()>;

    /// Set the synced flag for one provider
    async fn set_synced(&self, event_id: &str, provider: ProviderKind, synced: bool) -> Result<()>;

    /// Record the remote id an export created and mark the event synced
    async fn link_remote_id(
        &self,
        event_id: &str,
        provider: ProviderKind,
        remote_id: &str,
    ) -> Result<()>;

    /// Mark the event as needing sync for every provider
    async fn clear_sync_flags(&self, event_id: &str) -> Result<()>;

    /// Delete an event, returning whether a row existed
    async fn delete_event(&self, event_id: &str) -> Result<bool>;
}

/// Stored provider connections.
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    /// The active connection of `user_id` for `provider`, if any
    async fn find_active(
        &self,
        user_id: &str,
        provider: ProviderKind,
    ) -> Result<Option<CalendarProvider>>;

    /// Create or replace the connection on `(user_id, provider)` and activate it
    async fn upsert_connection(&self, connection: &ProviderConnection) -> Result<CalendarProvider>;

    /// Persist refreshed token material
    async fn update_tokens(
        &self,
        user_id: &str,
        provider: ProviderKind,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Soft-delete: clear the active flag
    async fn deactivate(&self, user_id: &str, provider: ProviderKind) -> Result<()>;

    /// Bump `updated_at` after a sync pass
    async fn touch(&self, user_id: &str, provider: ProviderKind) -> Result<()>;
}

/// Supplies currently valid access tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// `Ok(None)` means the provider is not connected for this user.
    async fn get_valid_token(
        &self,
        user_id: &str,
        provider: ProviderKind,
    ) -> std::result::Result<Option<String>, SyncError>;
}

/// One provider's complete sync pass, as driven by the sync manager.
#[async_trait]
pub trait ProviderSync: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Run import (and export when enabled) for `user_id`.
    ///
    /// Per-event problems end up inside the report; `Err` means the whole
    /// provider pass failed.
    async fn sync(&self, user_id: &str) -> std::result::Result<ProviderSyncReport, SyncError>;

    /// Best-effort removal of the remote counterpart of `event`.
    async fn delete_remote(
        &self,
        user_id: &str,
        event: &Event,
    ) -> std::result::Result<(), SyncError>;
}
