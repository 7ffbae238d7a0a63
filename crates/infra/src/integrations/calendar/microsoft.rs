//! Microsoft Graph calendar client

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use timeflow_core::RemoteCalendarClient;
use timeflow_domain::{
    Event, EventParseFailure, EventTime, ProviderKind, RemoteEvent, RemoteEventEntry, SyncError,
    TimeFlowError,
};
use tracing::{debug, instrument};

use super::transport::{Transport, TransportError};

const MICROSOFT_GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const OUTLOOK_TIMEZONE_HEADER: &str = r#"outlook.timezone="UTC""#;
const EVENT_SELECT: &str =
    "id,subject,bodyPreview,start,end,isAllDay,isCancelled,location,lastModifiedDateTime";
const PAGE_SIZE: u32 = 100;
/// Graph reports times without an offset once `outlook.timezone` is UTC.
const GRAPH_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Events of the signed-in user's default Outlook calendar.
pub struct MicrosoftCalendarClient {
    transport: Transport,
    base_url: String,
}

impl MicrosoftCalendarClient {
    pub fn new(timeout: Duration) -> Result<Self, TimeFlowError> {
        Ok(Self { transport: Transport::new(timeout)?, base_url: MICROSOFT_GRAPH_API_BASE.into() })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn event_url(&self, remote_id: &str) -> String {
        format!("{}/me/events/{}", self.base_url, remote_id)
    }
}

#[async_trait]
impl RemoteCalendarClient for MicrosoftCalendarClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Microsoft
    }

    #[instrument(skip(self, access_token), fields(provider = "microsoft"))]
    async fn fetch_events(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEventEntry>, SyncError> {
        let client = self.transport.client();
        let mut request = client
            .get(format!("{}/me/calendarView", self.base_url))
            .query(&[
                ("startDateTime", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("endDateTime", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("$select", EVENT_SELECT.to_string()),
                ("$orderby", "start/dateTime".to_string()),
                ("$top", PAGE_SIZE.to_string()),
            ]);
        let mut entries = Vec::new();

        loop {
            let page: GraphEventsPage = self
                .transport
                .send_json(
                    request.bearer_auth(access_token).header("Prefer", OUTLOOK_TIMEZONE_HEADER),
                )
                .await
                .map_err(fetch_error)?;

            entries.extend(
                page.value.into_iter().filter(|item| !is_cancelled(item)).map(parse_item),
            );

            // The next link already carries every query parameter.
            match page.next_link {
                Some(next_link) => request = client.get(next_link),
                None => break,
            }
        }

        debug!(count = entries.len(), "fetched microsoft events");
        Ok(entries)
    }

    #[instrument(
        skip(self, access_token, event),
        fields(provider = "microsoft", event_id = %event.id)
    )]
    async fn create_event(&self, access_token: &str, event: &Event) -> Result<String, SyncError> {
        let request = self
            .transport
            .client()
            .post(format!("{}/me/events", self.base_url))
            .bearer_auth(access_token)
            .json(&GraphEventBody::from(event));
        let created: CreatedEvent = self.transport.send_json(request).await.map_err(write_error)?;
        Ok(created.id)
    }

    #[instrument(skip(self, access_token, event), fields(provider = "microsoft"))]
    async fn update_event(
        &self,
        access_token: &str,
        remote_id: &str,
        event: &Event,
    ) -> Result<(), SyncError> {
        let request = self
            .transport
            .client()
            .patch(self.event_url(remote_id))
            .bearer_auth(access_token)
            .json(&GraphEventBody::from(event));
        self.transport.send_empty(request).await.map_err(write_error)?;
        Ok(())
    }

    #[instrument(skip(self, access_token), fields(provider = "microsoft"))]
    async fn delete_event(&self, access_token: &str, remote_id: &str) -> Result<(), SyncError> {
        let request =
            self.transport.client().delete(self.event_url(remote_id)).bearer_auth(access_token);
        match self.transport.send_empty(request).await {
            Ok(_) => Ok(()),
            Err(err) if matches!(err.status(), Some(404 | 410)) => {
                debug!(remote_id, "microsoft event already gone");
                Ok(())
            }
            Err(err) => Err(write_error(err)),
        }
    }
}

fn fetch_error(err: TransportError) -> SyncError {
    SyncError::RemoteFetchFailed { provider: ProviderKind::Microsoft, message: err.to_string() }
}

fn write_error(err: TransportError) -> SyncError {
    SyncError::RemoteWriteFailed { provider: ProviderKind::Microsoft, message: err.to_string() }
}

fn is_cancelled(item: &Value) -> bool {
    item.get("isCancelled").and_then(Value::as_bool).unwrap_or(false)
}

fn parse_item(item: Value) -> RemoteEventEntry {
    let remote_id = item.get("id").and_then(Value::as_str).map(str::to_string);
    let event: GraphEvent = serde_json::from_value(item).map_err(|err| EventParseFailure {
        remote_id: remote_id.clone(),
        field: "event".into(),
        reason: err.to_string(),
    })?;

    let Some(id) = event.id.filter(|id| !id.is_empty()) else {
        return Err(EventParseFailure {
            remote_id: None,
            field: "id".into(),
            reason: "missing".into(),
        });
    };
    let failure = |field: &str, reason: String| EventParseFailure {
        remote_id: Some(id.clone()),
        field: field.into(),
        reason,
    };

    let start = parse_time(event.start, event.is_all_day).map_err(|r| failure("start", r))?;
    let end = parse_time(event.end, event.is_all_day).map_err(|r| failure("end", r))?;
    let last_modified = event
        .last_modified
        .ok_or_else(|| "missing".to_string())
        .and_then(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|err| format!("invalid timestamp {raw:?}: {err}"))
        })
        .map_err(|r| failure("lastModifiedDateTime", r))?;

    Ok(RemoteEvent {
        id,
        title: RemoteEvent::title_or_default(event.subject),
        description: event.body_preview.filter(|d| !d.trim().is_empty()),
        start,
        end,
        location: event
            .location
            .and_then(|location| location.display_name)
            .filter(|name| !name.trim().is_empty()),
        last_modified,
    })
}

fn parse_time(time: Option<GraphDateTime>, all_day: bool) -> Result<EventTime, String> {
    let raw = time.ok_or_else(|| "missing".to_string())?.date_time;
    let at = match DateTime::parse_from_rfc3339(&raw) {
        Ok(at) => at.with_timezone(&Utc),
        Err(_) => NaiveDateTime::parse_from_str(&raw, GRAPH_DATETIME_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|err| format!("invalid date time {raw:?}: {err}"))?,
    };

    Ok(if all_day { EventTime::Date(at.date_naive()) } else { EventTime::DateTime(at) })
}

#[derive(Debug, Deserialize)]
struct GraphEventsPage {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEvent {
    id: Option<String>,
    subject: Option<String>,
    body_preview: Option<String>,
    start: Option<GraphDateTime>,
    end: Option<GraphDateTime>,
    #[serde(default)]
    is_all_day: bool,
    location: Option<GraphLocation>,
    #[serde(rename = "lastModifiedDateTime")]
    last_modified: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
    #[serde(default = "utc_zone")]
    time_zone: String,
}

impl GraphDateTime {
    fn from_local(at: DateTime<Utc>, all_day: bool) -> Self {
        let at = EventTime::from_local(at, all_day).to_utc();
        Self { date_time: at.format("%Y-%m-%dT%H:%M:%S").to_string(), time_zone: utc_zone() }
    }
}

fn utc_zone() -> String {
    "UTC".into()
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphLocation {
    display_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphItemBody {
    content_type: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphEventBody {
    subject: String,
    body: GraphItemBody,
    start: GraphDateTime,
    end: GraphDateTime,
    is_all_day: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<GraphLocation>,
}

impl From<&Event> for GraphEventBody {
    fn from(event: &Event) -> Self {
        Self {
            subject: event.title.clone(),
            body: GraphItemBody {
                content_type: "text",
                content: event.description.clone().unwrap_or_default(),
            },
            start: GraphDateTime::from_local(event.start, event.all_day),
            end: GraphDateTime::from_local(event.end, event.all_day),
            is_all_day: event.all_day,
            location: event
                .location
                .clone()
                .map(|name| GraphLocation { display_name: Some(name) }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}
