//! Per-provider reconciliation between remote events and the local store
//!
//! Import is last-write-wins on the provider's modification timestamp versus
//! the local `updated_at`, with a strict `>`: ties keep the local version.
//! Local events whose remote counterpart no longer shows up in the window are
//! marked unsynced, never deleted.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use timeflow_domain::constants::SYNC_WINDOW_MONTHS;
use timeflow_domain::{
    Event, EventPatch, NewEvent, ProviderKind, ProviderSyncReport, RemoteEvent, SyncDirection,
    SyncError, SyncMode, SyncResult, SyncTally, SyncWindow,
};
use tracing::{debug, info, instrument, warn};

use super::ports::{EventRepository, ProviderRepository, ProviderSync, TokenSource};
use crate::calendar_ports::RemoteCalendarClient;

/// Runs the reconciliation for one provider.
pub struct ProviderSyncAdapter {
    remote: Arc<dyn RemoteCalendarClient>,
    tokens: Arc<dyn TokenSource>,
    events: Arc<dyn EventRepository>,
    providers: Arc<dyn ProviderRepository>,
    mode: SyncMode,
    window_months: u32,
}

impl ProviderSyncAdapter {
    pub fn new(
        remote: Arc<dyn RemoteCalendarClient>,
        tokens: Arc<dyn TokenSource>,
        events: Arc<dyn EventRepository>,
        providers: Arc<dyn ProviderRepository>,
    ) -> Self {
        Self {
            remote,
            tokens,
            events,
            providers,
            mode: SyncMode::ImportOnly,
            window_months: SYNC_WINDOW_MONTHS,
        }
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    fn kind(&self) -> ProviderKind {
        self.remote.provider()
    }

    /// Token for this provider, or the reason there is none.
    ///
    /// Connection-level errors come back unchanged so the report can ask for
    /// a reconnect; anything else is folded into `TokenUnavailable`.
    async fn access_token(&self, user_id: &str) -> Result<String, SyncError> {
        let provider = self.kind();
        match self.tokens.get_valid_token(user_id, provider).await {
            Ok(Some(token)) => Ok(token),
            Ok(None) => Err(SyncError::NotConnected { provider }),
            Err(err) if err.requires_reconnect() => Err(err),
            Err(err) => Err(SyncError::TokenUnavailable { provider, message: err.to_string() }),
        }
    }

    /// Import remote events into the local store.
    #[instrument(skip(self), fields(provider = %self.kind()))]
    pub async fn sync_to_local(&self, user_id: &str) -> SyncResult {
        let direction = SyncDirection::ToLocal;
        let provider = self.kind();

        let token = match self.access_token(user_id).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "skipping import");
                return SyncResult::interrupted(direction, err);
            }
        };

        let window = SyncWindow::around(Utc::now(), self.window_months);
        let remote_events = match self.remote.fetch_events(&token, window.start, window.end).await
        {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "remote fetch failed");
                return SyncResult::interrupted(direction, err);
            }
        };

        let mut known = match self.events.find_linked_events(user_id, provider).await {
            Ok(events) => index_by_remote_id(events, provider),
            Err(err) => return SyncResult::interrupted(direction, SyncError::from(err)),
        };

        debug!(fetched = remote_events.len(), known = known.len(), "reconciling remote events");

        let mut tally = SyncTally::new(direction);
        for entry in remote_events {
            let remote = match entry {
                Ok(remote) => remote,
                Err(failure) => {
                    warn!(error = %failure, "skipping malformed remote event");
                    // Still present remotely, so not a candidate for unsyncing.
                    if let Some(remote_id) = &failure.remote_id {
                        known.remove(remote_id);
                    }
                    tally.record_error(failure);
                    continue;
                }
            };

            let local = known.remove(&remote.id);
            if let Err(err) = self.import_one(user_id, &remote, local.as_ref(), &mut tally).await {
                warn!(remote_id = %remote.id, error = %err, "failed to import remote event");
                tally.record_error(err);
            }
        }

        for (remote_id, local) in known {
            match self.events.set_synced(&local.id, provider, false).await {
                Ok(()) => tally.record_unsynced(),
                Err(err) => {
                    warn!(%remote_id, error = %err, "failed to mark event unsynced");
                    tally.record_error(SyncError::PerEventWriteFailed {
                        remote_id,
                        message: err.to_string(),
                    });
                }
            }
        }

        if let Err(err) = self.providers.touch(user_id, provider).await {
            warn!(error = %err, "failed to touch provider after import");
        }

        let result = tally.finish();
        info!(
            created = result.created(),
            updated = result.updated(),
            unsynced = result.unsynced(),
            errors = result.errors().len(),
            "import finished"
        );
        result
    }

    async fn import_one(
        &self,
        user_id: &str,
        remote: &RemoteEvent,
        local: Option<&Event>,
        tally: &mut SyncTally,
    ) -> Result<(), SyncError> {
        let provider = self.kind();
        let write_failed = |err: timeflow_domain::TimeFlowError| SyncError::PerEventWriteFailed {
            remote_id: remote.id.clone(),
            message: err.to_string(),
        };

        match local {
            None => {
                let new_event = NewEvent::imported(user_id, provider, remote);
                self.events.insert_event(&new_event).await.map_err(write_failed)?;
                tally.record_created();
            }
            Some(local) if remote.last_modified > local.updated_at => {
                let patch = EventPatch::from(remote);
                self.events
                    .apply_remote_update(&local.id, provider, &patch)
                    .await
                    .map_err(write_failed)?;
                tally.record_updated();
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Export local changes. `ImportOnly` never contacts the provider.
    #[instrument(skip(self), fields(provider = %self.kind()))]
    pub async fn sync_to_remote(&self, user_id: &str) -> SyncResult {
        let direction = SyncDirection::ToRemote;
        if !self.mode.exports() {
            return SyncResult::empty(direction);
        }
        let provider = self.kind();

        let token = match self.access_token(user_id).await {
            Ok(token) => token,
            Err(err) => return SyncResult::interrupted(direction, err),
        };

        let window = SyncWindow::around(Utc::now(), self.window_months);
        let pending = match self
            .events
            .find_pending_export(user_id, provider, window.start, window.end)
            .await
        {
            Ok(events) => events,
            Err(err) => return SyncResult::interrupted(direction, SyncError::from(err)),
        };

        let mut tally = SyncTally::new(direction);
        for event in pending {
            if let Err(err) = self.export_one(&token, &event, &mut tally).await {
                warn!(event_id = %event.id, error = %err, "failed to export event");
                tally.record_error(format!("event {}: {err}", event.id));
            }
        }

        let result = tally.finish();
        info!(
            created = result.created(),
            updated = result.updated(),
            errors = result.errors().len(),
            "export finished"
        );
        result
    }

    async fn export_one(
        &self,
        token: &str,
        event: &Event,
        tally: &mut SyncTally,
    ) -> Result<(), SyncError> {
        let provider = self.kind();
        let bookkeeping_failed = |err: timeflow_domain::TimeFlowError| {
            SyncError::RemoteWriteFailed {
                provider,
                message: format!("remote write succeeded but local update failed: {err}"),
            }
        };

        match event.remote_id(provider) {
            Some(remote_id) => {
                self.remote.update_event(token, remote_id, event).await?;
                self.events
                    .set_synced(&event.id, provider, true)
                    .await
                    .map_err(bookkeeping_failed)?;
                tally.record_updated();
            }
            None => {
                let remote_id = self.remote.create_event(token, event).await?;
                self.events
                    .link_remote_id(&event.id, provider, &remote_id)
                    .await
                    .map_err(bookkeeping_failed)?;
                tally.record_created();
            }
        }
        Ok(())
    }
}

fn index_by_remote_id(events: Vec<Event>, provider: ProviderKind) -> HashMap<String, Event> {
    events
        .into_iter()
        .filter_map(|event| {
            let remote_id = event.remote_id(provider)?.to_string();
            Some((remote_id, event))
        })
        .collect()
}

#[async_trait]
impl ProviderSync for ProviderSyncAdapter {
    fn provider(&self) -> ProviderKind {
        self.kind()
    }

    async fn sync(&self, user_id: &str) -> Result<ProviderSyncReport, SyncError> {
        let to_local = self.sync_to_local(user_id).await;
        let to_remote = self.sync_to_remote(user_id).await;
        Ok(ProviderSyncReport::new(to_local, to_remote))
    }

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn delete_remote(&self, user_id: &str, event: &Event) -> Result<(), SyncError> {
        let Some(remote_id) = event.remote_id(self.kind()) else {
            return Ok(());
        };
        let token = self.access_token(user_id).await?;
        self.remote.delete_event(&token, remote_id).await?;
        debug!(provider = %self.kind(), %remote_id, "remote event deleted");
        Ok(())
    }
}
