//! Database implementations

pub mod event_repository;
pub mod manager;
pub mod provider_repository;

pub use event_repository::*;
pub use manager::*;
pub use provider_repository::*;

use chrono::{DateTime, Utc};
use timeflow_domain::TimeFlowError;
use tokio::task;

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Column decoder for epoch-millisecond timestamps.
pub(crate) fn from_millis(column: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

/// Failure of a `spawn_blocking` task running SQLite work.
pub(crate) fn map_join_error(err: task::JoinError) -> TimeFlowError {
    if err.is_cancelled() {
        TimeFlowError::Internal("blocking database task cancelled".into())
    } else {
        TimeFlowError::Internal(format!("blocking database task failed: {err}"))
    }
}
