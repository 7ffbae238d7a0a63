//! Local events and their remote counterparts

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::provider::ProviderKind;
use crate::constants::{IMPORTED_EVENT_CATEGORY, UNTITLED_EVENT_TITLE};

/// The canonical calendar entry owned by this application.
///
/// A remote-id field is only ever set once the event has been linked to that
/// provider's event. Sync flags are tracked independently per provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub location: Option<String>,
    pub category: String,
    pub google_event_id: Option<String>,
    pub microsoft_event_id: Option<String>,
    pub synced_to_google: bool,
    pub synced_to_microsoft: bool,
    /// Stamped by the store on every content write.
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn remote_id(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::Google => self.google_event_id.as_deref(),
            ProviderKind::Microsoft => self.microsoft_event_id.as_deref(),
        }
    }

    pub fn is_synced(&self, provider: ProviderKind) -> bool {
        match provider {
            ProviderKind::Google => self.synced_to_google,
            ProviderKind::Microsoft => self.synced_to_microsoft,
        }
    }

    /// True when the export direction has something to push for `provider`.
    pub fn needs_export(&self, provider: ProviderKind) -> bool {
        self.remote_id(provider).is_none() || !self.is_synced(provider)
    }
}

/// Insert payload for the local store. The store assigns `id` and `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub location: Option<String>,
    pub category: String,
    pub google_event_id: Option<String>,
    pub microsoft_event_id: Option<String>,
    pub synced_to_google: bool,
    pub synced_to_microsoft: bool,
}

impl NewEvent {
    /// Local copy of a remote event, linked to it and marked synced.
    pub fn imported(user_id: &str, provider: ProviderKind, remote: &RemoteEvent) -> Self {
        let patch = EventPatch::from(remote);
        let (google_event_id, microsoft_event_id) = match provider {
            ProviderKind::Google => (Some(remote.id.clone()), None),
            ProviderKind::Microsoft => (None, Some(remote.id.clone())),
        };

        Self {
            user_id: user_id.to_string(),
            title: patch.title,
            description: patch.description,
            start: patch.start,
            end: patch.end,
            all_day: patch.all_day,
            location: patch.location,
            category: IMPORTED_EVENT_CATEGORY.to_string(),
            synced_to_google: google_event_id.is_some(),
            synced_to_microsoft: microsoft_event_id.is_some(),
            google_event_id,
            microsoft_event_id,
        }
    }
}

/// Fields overwritten on a local event when its remote version wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub location: Option<String>,
}

impl From<&RemoteEvent> for EventPatch {
    fn from(remote: &RemoteEvent) -> Self {
        Self {
            title: remote.title.clone(),
            description: remote.description.clone(),
            start: remote.start.to_utc(),
            end: remote.end.to_utc(),
            all_day: remote.is_all_day(),
            location: remote.location.clone(),
        }
    }
}

/// Start or end of a remote event. All-day events carry a date only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTime {
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl EventTime {
    /// Wire representation for a local timestamp.
    pub fn from_local(at: DateTime<Utc>, all_day: bool) -> Self {
        if all_day {
            Self::Date(at.date_naive())
        } else {
            Self::DateTime(at)
        }
    }

    pub fn is_date_only(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Dates map to midnight UTC.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            Self::Date(date) => date.and_time(chrono::NaiveTime::MIN).and_utc(),
            Self::DateTime(at) => *at,
        }
    }
}

/// An event instance as reported by a provider, already normalised to UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub location: Option<String>,
    /// Provider-reported last modification.
    pub last_modified: DateTime<Utc>,
}

impl RemoteEvent {
    pub fn is_all_day(&self) -> bool {
        self.start.is_date_only()
    }

    /// Applies the untitled fallback used for every imported event.
    pub fn title_or_default(title: Option<String>) -> String {
        title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED_EVENT_TITLE.to_string())
    }
}

/// A remote item that could not be turned into a [`RemoteEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error(
    "malformed remote event {}: {field}: {reason}",
    .remote_id.as_deref().unwrap_or("<missing id>")
)]
pub struct EventParseFailure {
    pub remote_id: Option<String>,
    pub field: String,
    pub reason: String,
}

/// Fetch results keep provider order; malformed items stay in place as errors.
pub type RemoteEventEntry = std::result::Result<RemoteEvent, EventParseFailure>;
