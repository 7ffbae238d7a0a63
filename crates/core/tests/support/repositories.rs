use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use timeflow_core::{EventRepository, ProviderRepository};
use timeflow_domain::{
    CalendarProvider, Event, EventPatch, NewEvent, ProviderConnection, ProviderKind, Result,
    TimeFlowError,
};

/// In-memory event store that stamps `updated_at` like the real one.
///
/// Writes touching a remote id registered via [`fail_writes_for`] fail with a
/// database error so partial-failure paths can be exercised.
#[derive(Default)]
pub struct InMemoryEventRepository {
    events: Mutex<Vec<Event>>,
    failing_remote_ids: Mutex<HashSet<String>>,
    next_id: Mutex<u64>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_for(&self, remote_id: &str) {
        self.failing_remote_ids.lock().unwrap().insert(remote_id.to_string());
    }

    pub fn all(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn get(&self, event_id: &str) -> Option<Event> {
        self.events.lock().unwrap().iter().find(|e| e.id == event_id).cloned()
    }

    pub fn by_remote_id(&self, provider: ProviderKind, remote_id: &str) -> Option<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.remote_id(provider) == Some(remote_id))
            .cloned()
    }

    /// Seed an event as if a user created it, with an explicit timestamp.
    pub fn seed(&self, mut event: Event) -> Event {
        if event.id.is_empty() {
            event.id = self.allocate_id();
        }
        self.events.lock().unwrap().push(event.clone());
        event
    }

    fn allocate_id(&self) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("evt-{next}")
    }

    fn check_failure(&self, event: &Event) -> Result<()> {
        let failing = self.failing_remote_ids.lock().unwrap();
        let hit = [event.google_event_id.as_deref(), event.microsoft_event_id.as_deref()]
            .into_iter()
            .flatten()
            .any(|id| failing.contains(id));
        if hit {
            return Err(TimeFlowError::Database("simulated write failure".into()));
        }
        Ok(())
    }

    fn modify(&self, event_id: &str, apply: impl FnOnce(&mut Event)) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        let event = events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| TimeFlowError::NotFound(format!("event {event_id}")))?;
        self.check_failure(event)?;
        apply(event);
        Ok(())
    }
}

/// Event fixture linked to nothing, owned by `user_id`.
pub fn local_event(user_id: &str, title: &str, updated_at: DateTime<Utc>) -> Event {
    let start = Utc::now();
    Event {
        id: String::new(),
        user_id: user_id.to_string(),
        title: title.to_string(),
        description: None,
        start,
        end: start + chrono::Duration::hours(1),
        all_day: false,
        location: None,
        category: "work".to_string(),
        google_event_id: None,
        microsoft_event_id: None,
        synced_to_google: false,
        synced_to_microsoft: false,
        updated_at,
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn find_event(&self, event_id: &str) -> Result<Option<Event>> {
        Ok(self.get(event_id))
    }

    async fn find_linked_events(
        &self,
        user_id: &str,
        provider: ProviderKind,
    ) -> Result<Vec<Event>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id && e.remote_id(provider).is_some())
            .cloned()
            .collect())
    }

    async fn find_pending_export(
        &self,
        user_id: &str,
        provider: ProviderKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id && e.start >= start && e.start <= end)
            .filter(|e| e.needs_export(provider))
            .cloned()
            .collect())
    }

    async fn insert_event(&self, new_event: &NewEvent) -> Result<Event> {
        let event = Event {
            id: self.allocate_id(),
            user_id: new_event.user_id.clone(),
            title: new_event.title.clone(),
            description: new_event.description.clone(),
            start: new_event.start,
            end: new_event.end,
            all_day: new_event.all_day,
            location: new_event.location.clone(),
            category: new_event.category.clone(),
            google_event_id: new_event.google_event_id.clone(),
            microsoft_event_id: new_event.microsoft_event_id.clone(),
            synced_to_google: new_event.synced_to_google,
            synced_to_microsoft: new_event.synced_to_microsoft,
            updated_at: Utc::now(),
        };
        self.check_failure(&event)?;
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }

    async fn apply_remote_update(
        &self,
        event_id: &str,
        provider: ProviderKind,
        patch: &EventPatch,
    ) -> Result<()> {
        self.modify(event_id, |event| {
            event.title = patch.title.clone();
            event.description = patch.description.clone();
            event.start = patch.start;
            event.end = patch.end;
            event.all_day = patch.all_day;
            event.location = patch.location.clone();
            match provider {
                ProviderKind::Google => event.synced_to_google = true,
                ProviderKind::Microsoft => event.synced_to_microsoft = true,
            }
            event.updated_at = Utc::now();
        })
    }

    async fn set_synced(&self, event_id: &str, provider: ProviderKind, synced: bool) -> Result<()> {
        self.modify(event_id, |event| match provider {
            ProviderKind::Google => event.synced_to_google = synced,
            ProviderKind::Microsoft => event.synced_to_microsoft = synced,
        })
    }

    async fn link_remote_id(
        &self,
        event_id: &str,
        provider: ProviderKind,
        remote_id: &str,
    ) -> Result<()> {
        self.modify(event_id, |event| match provider {
            ProviderKind::Google => {
                event.google_event_id = Some(remote_id.to_string());
                event.synced_to_google = true;
            }
            ProviderKind::Microsoft => {
                event.microsoft_event_id = Some(remote_id.to_string());
                event.synced_to_microsoft = true;
            }
        })
    }

    async fn clear_sync_flags(&self, event_id: &str) -> Result<()> {
        self.modify(event_id, |event| {
            event.synced_to_google = false;
            event.synced_to_microsoft = false;
        })
    }

    async fn delete_event(&self, event_id: &str) -> Result<bool> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| e.id != event_id);
        Ok(events.len() != before)
    }
}

/// In-memory provider connections keyed on `(user_id, provider)`.
#[derive(Default)]
pub struct InMemoryProviderRepository {
    rows: Mutex<Vec<CalendarProvider>>,
    pub touches: Mutex<Vec<(String, ProviderKind)>>,
}

impl InMemoryProviderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, row: CalendarProvider) {
        self.rows.lock().unwrap().push(row);
    }

    pub fn row(&self, user_id: &str, provider: ProviderKind) -> Option<CalendarProvider> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.user_id == user_id && r.provider == provider)
            .cloned()
    }
}

/// Active connection with the given expiry.
pub fn connection(
    user_id: &str,
    provider: ProviderKind,
    expires_at: DateTime<Utc>,
    refresh_token: Option<&str>,
) -> CalendarProvider {
    CalendarProvider {
        id: format!("{user_id}-{provider}"),
        user_id: user_id.to_string(),
        provider,
        email: Some(format!("{user_id}@example.com")),
        access_token: Some("stored-access".to_string()),
        refresh_token: refresh_token.map(str::to_string),
        token_expires_at: Some(expires_at),
        active: true,
        updated_at: Utc::now(),
    }
}

#[async_trait]
impl ProviderRepository for InMemoryProviderRepository {
    async fn find_active(
        &self,
        user_id: &str,
        provider: ProviderKind,
    ) -> Result<Option<CalendarProvider>> {
        Ok(self.row(user_id, provider).filter(|r| r.active))
    }

    async fn upsert_connection(&self, connection: &ProviderConnection) -> Result<CalendarProvider> {
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|r| !(r.user_id == connection.user_id && r.provider == connection.provider));
        let row = CalendarProvider {
            id: format!("{}-{}", connection.user_id, connection.provider),
            user_id: connection.user_id.clone(),
            provider: connection.provider,
            email: connection.email.clone(),
            access_token: Some(connection.access_token.clone()),
            refresh_token: connection.refresh_token.clone(),
            token_expires_at: Some(connection.token_expires_at),
            active: true,
            updated_at: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn update_tokens(
        &self,
        user_id: &str,
        provider: ProviderKind,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.user_id == user_id && r.provider == provider)
            .ok_or_else(|| TimeFlowError::NotFound("provider".into()))?;
        row.access_token = Some(access_token.to_string());
        if let Some(refresh_token) = refresh_token {
            row.refresh_token = Some(refresh_token.to_string());
        }
        row.token_expires_at = Some(expires_at);
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn deactivate(&self, user_id: &str, provider: ProviderKind) -> Result<()> {
        for row in self.rows.lock().unwrap().iter_mut() {
            if row.user_id == user_id && row.provider == provider {
                row.active = false;
            }
        }
        Ok(())
    }

    async fn touch(&self, user_id: &str, provider: ProviderKind) -> Result<()> {
        self.touches.lock().unwrap().push((user_id.to_string(), provider));
        Ok(())
    }
}
