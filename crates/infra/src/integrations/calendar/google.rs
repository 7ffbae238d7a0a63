//! Google Calendar API v3 client

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use timeflow_core::RemoteCalendarClient;
use timeflow_domain::constants::GOOGLE_PRIMARY_CALENDAR_ID;
use timeflow_domain::{
    Event, EventParseFailure, EventTime, ProviderKind, RemoteEvent, RemoteEventEntry, SyncError,
    TimeFlowError,
};
use tracing::{debug, instrument};

use super::transport::{Transport, TransportError};

const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const PAGE_SIZE: u32 = 250;

/// Events of the user's primary Google calendar.
pub struct GoogleCalendarClient {
    transport: Transport,
    base_url: String,
}

impl GoogleCalendarClient {
    pub fn new(timeout: Duration) -> Result<Self, TimeFlowError> {
        Ok(Self { transport: Transport::new(timeout)?, base_url: GOOGLE_CALENDAR_API_BASE.into() })
    }

    /// Point the client at another API root (test servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.base_url, GOOGLE_PRIMARY_CALENDAR_ID)
    }

    fn event_url(&self, remote_id: &str) -> String {
        format!("{}/{}", self.events_url(), remote_id)
    }
}

#[async_trait]
impl RemoteCalendarClient for GoogleCalendarClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Google
    }

    #[instrument(skip(self, access_token), fields(provider = "google"))]
    async fn fetch_events(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEventEntry>, SyncError> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("timeMax", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let request =
                self.transport
                    .client()
                    .get(self.events_url())
                    .bearer_auth(access_token)
                    .query(&query);
            let page: GoogleEventsPage =
                self.transport.send_json(request).await.map_err(fetch_error)?;

            entries.extend(
                page.items
                    .into_iter()
                    .filter(|item| !is_cancelled(item))
                    .map(parse_item),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = entries.len(), "fetched google events");
        Ok(entries)
    }

    #[instrument(
        skip(self, access_token, event),
        fields(provider = "google", event_id = %event.id)
    )]
    async fn create_event(&self, access_token: &str, event: &Event) -> Result<String, SyncError> {
        let request = self
            .transport
            .client()
            .post(self.events_url())
            .bearer_auth(access_token)
            .json(&GoogleEventBody::from(event));
        let created: CreatedEvent = self.transport.send_json(request).await.map_err(write_error)?;
        Ok(created.id)
    }

    #[instrument(skip(self, access_token, event), fields(provider = "google"))]
    async fn update_event(
        &self,
        access_token: &str,
        remote_id: &str,
        event: &Event,
    ) -> Result<(), SyncError> {
        let request = self
            .transport
            .client()
            .put(self.event_url(remote_id))
            .bearer_auth(access_token)
            .json(&GoogleEventBody::from(event));
        self.transport.send_empty(request).await.map_err(write_error)?;
        Ok(())
    }

    #[instrument(skip(self, access_token), fields(provider = "google"))]
    async fn delete_event(&self, access_token: &str, remote_id: &str) -> Result<(), SyncError> {
        let request =
            self.transport.client().delete(self.event_url(remote_id)).bearer_auth(access_token);
        match self.transport.send_empty(request).await {
            Ok(_) => Ok(()),
            Err(err) if matches!(err.status(), Some(404 | 410)) => {
                debug!(remote_id, "google event already gone");
                Ok(())
            }
            Err(err) => Err(write_error(err)),
        }
    }
}

fn fetch_error(err: TransportError) -> SyncError {
    SyncError::RemoteFetchFailed { provider: ProviderKind::Google, message: err.to_string() }
}

fn write_error(err: TransportError) -> SyncError {
    SyncError::RemoteWriteFailed { provider: ProviderKind::Google, message: err.to_string() }
}

fn is_cancelled(item: &Value) -> bool {
    item.get("status").and_then(Value::as_str) == Some("cancelled")
}

fn parse_item(item: Value) -> RemoteEventEntry {
    let remote_id = item.get("id").and_then(Value::as_str).map(str::to_string);
    let event: GoogleEvent = serde_json::from_value(item).map_err(|err| EventParseFailure {
        remote_id: remote_id.clone(),
        field: "event".into(),
        reason: err.to_string(),
    })?;

    let id = event.id.filter(|id| !id.is_empty()).ok_or_else(|| EventParseFailure {
        remote_id: None,
        field: "id".into(),
        reason: "missing".into(),
    })?;
    let failure = |field: &str, reason: String| EventParseFailure {
        remote_id: Some(id.clone()),
        field: field.into(),
        reason,
    };

    let start = parse_time(event.start).map_err(|reason| failure("start", reason))?;
    let end = parse_time(event.end).map_err(|reason| failure("end", reason))?;
    let last_modified = event
        .updated
        .ok_or_else(|| "missing".to_string())
        .and_then(|raw| parse_rfc3339(&raw))
        .map_err(|reason| failure("updated", reason))?;

    Ok(RemoteEvent {
        id,
        title: RemoteEvent::title_or_default(event.summary),
        description: event.description.filter(|d| !d.trim().is_empty()),
        start,
        end,
        location: event.location.filter(|l| !l.trim().is_empty()),
        last_modified,
    })
}

fn parse_time(time: Option<GoogleEventTime>) -> Result<EventTime, String> {
    let time = time.ok_or_else(|| "missing".to_string())?;
    if let Some(raw) = time.date_time {
        return parse_rfc3339(&raw).map(EventTime::DateTime);
    }
    if let Some(raw) = time.date {
        return NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(EventTime::Date)
            .map_err(|err| format!("invalid date {raw:?}: {err}"));
    }
    Err("neither dateTime nor date present".into())
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| format!("invalid timestamp {raw:?}: {err}"))
}

#[derive(Debug, Deserialize)]
struct GoogleEventsPage {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<GoogleEventTime>,
    end: Option<GoogleEventTime>,
    updated: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct GoogleEventTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
}

impl GoogleEventTime {
    fn from_local(at: DateTime<Utc>, all_day: bool) -> Self {
        match EventTime::from_local(at, all_day) {
            EventTime::Date(date) => Self { date: Some(date.to_string()), ..Self::default() },
            EventTime::DateTime(at) => Self {
                date_time: Some(at.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct GoogleEventBody {
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    start: GoogleEventTime,
    end: GoogleEventTime,
}

impl From<&Event> for GoogleEventBody {
    fn from(event: &Event) -> Self {
        Self {
            summary: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start: GoogleEventTime::from_local(event.start, event.all_day),
            end: GoogleEventTime::from_local(event.end, event.all_day),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const EVENTS_PATH: &str = "/calendars/primary/events";

    fn client(server: &MockServer) -> GoogleCalendarClient {
        GoogleCalendarClient::new(Duration::from_secs(5)).unwrap().with_base_url(server.uri())
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap(),
        )
    }

    fn local_event() -> Event {
        Event {
            id: "local-1".into(),
            user_id: "user-1".into(),
            title: "Planning".into(),
            description: Some("quarterly".into()),
            start: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            all_day: false,
            location: None,
            category: "work".into(),
            google_event_id: None,
            microsoft_event_id: None,
            synced_to_google: false,
            synced_to_microsoft: false,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fetch_follows_page_tokens_and_parses_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EVENTS_PATH))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "g-2",
                    "summary": "Offsite",
                    "start": {"date": "2024-05-03"},
                    "end": {"date": "2024-05-04"},
                    "updated": "2024-04-01T08:00:00.000Z"
                }]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(EVENTS_PATH))
            .and(header("authorization", "Bearer token-1"))
            .and(query_param("singleEvents", "true"))
            .and(query_param("orderBy", "startTime"))
            .and(query_param("timeMin", "2024-02-01T00:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "id": "g-1",
                    "summary": "  ",
                    "location": "Room 4",
                    "start": {"dateTime": "2024-05-01T11:00:00+02:00"},
                    "end": {"dateTime": "2024-05-01T12:00:00+02:00"},
                    "updated": "2024-04-02T10:30:00.000Z"
                }],
                "nextPageToken": "page-2"
            })))
            .mount(&server)
            .await;

        let (start, end) = window();
        let entries = client(&server).fetch_events("token-1", start, end).await.unwrap();

        assert_eq!(entries.len(), 2);
        let first = entries[0].as_ref().unwrap();
        assert_eq!(first.id, "g-1");
        assert_eq!(first.title, "Untitled Event");
        assert_eq!(first.location.as_deref(), Some("Room 4"));
        assert_eq!(
            first.start,
            EventTime::DateTime(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
        );
        let second = entries[1].as_ref().unwrap();
        assert!(second.is_all_day());
        assert_eq!(second.start, EventTime::Date(NaiveDate::from_ymd_opt(2024, 5, 3).unwrap()));
    }

    #[tokio::test]
    async fn malformed_items_stay_in_place() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(EVENTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"summary": "no id",
                     "start": {"date": "2024-05-03"}, "end": {"date": "2024-05-04"}},
                    {"id": "g-bad",
                     "start": {"dateTime": "yesterday"}, "end": {"dateTime": "today"},
                     "updated": "2024-04-01T08:00:00Z"},
                    {"id": "g-gone", "status": "cancelled"},
                    {"id": "g-ok", "summary": "Fine",
                     "start": {"dateTime": "2024-05-01T09:00:00Z"},
                     "end": {"dateTime": "2024-05-01T10:00:00Z"},
                     "updated": "2024-04-01T08:00:00Z"}
                ]
            })))
            .mount(&server)
            .await;

        let (start, end) = window();
        let entries = client(&server).fetch_events("token", start, end).await.unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].as_ref().unwrap_err().field, "id");
        let bad = entries[1].as_ref().unwrap_err();
        assert_eq!(bad.remote_id.as_deref(), Some("g-bad"));
        assert_eq!(bad.field, "start");
        assert_eq!(entries[2].as_ref().unwrap().title, "Fine");
    }

    #[tokio::test]
    async fn fetch_errors_are_typed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
            .mount(&server)
            .await;

        let (start, end) = window();
        let err = client(&server).fetch_events("stale", start, end).await.unwrap_err();

        assert_eq!(
            err,
            SyncError::RemoteFetchFailed {
                provider: ProviderKind::Google,
                message: "HTTP 401: invalid credentials".into(),
            }
        );
    }

    #[tokio::test]
    async fn create_posts_the_event_and_returns_the_remote_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(EVENTS_PATH))
            .and(body_partial_json(json!({
                "summary": "Planning",
                "description": "quarterly",
                "start": {"dateTime": "2024-05-01T09:00:00Z"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "g-new"})))
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server).create_event("token", &local_event()).await.unwrap();

        assert_eq!(id, "g-new");
    }

    #[tokio::test]
    async fn all_day_events_are_written_as_dates() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("{EVENTS_PATH}/g-1")))
            .and(body_partial_json(json!({
                "start": {"date": "2024-05-01"},
                "end": {"date": "2024-05-02"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "g-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut event = local_event();
        event.all_day = true;
        event.start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        event.end = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();

        client(&server).update_event("token", "g-1", &event).await.unwrap();
    }

    #[tokio::test]
    async fn deleting_a_missing_event_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(format!("{EVENTS_PATH}/g-gone")))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("{EVENTS_PATH}/g-locked")))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let client = client(&server);
        client.delete_event("token", "g-gone").await.unwrap();
        let err = client.delete_event("token", "g-locked").await.unwrap_err();

        assert!(matches!(err, SyncError::RemoteWriteFailed { provider: ProviderKind::Google, .. }));
    }
}
