//! Shared test helpers for `timeflow-core` integration tests.
//!
//! In-memory implementations of every port so the sync tests can focus on
//! behaviour instead of boilerplate.
#![allow(dead_code)]

pub mod calendar;
pub mod repositories;

use chrono::{DateTime, Duration, TimeZone, Utc};
use timeflow_domain::{EventTime, RemoteEvent};

/// One-hour remote event at 09:00 UTC today.
pub fn remote_event(id: &str, title: &str, last_modified: DateTime<Utc>) -> RemoteEvent {
    let start = Utc::now().date_naive().and_hms_opt(9, 0, 0).unwrap().and_utc();
    RemoteEvent {
        id: id.to_string(),
        title: title.to_string(),
        description: Some(format!("{title} description")),
        start: EventTime::DateTime(start),
        end: EventTime::DateTime(start + Duration::hours(1)),
        location: Some("Room 1".to_string()),
        last_modified,
    }
}

/// A timestamp far enough in the past to lose every last-write-wins check.
pub fn long_ago() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}
