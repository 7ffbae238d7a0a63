//! SQLite implementation of the `EventRepository` port.
//!
//! Content writes (insert, remote update) stamp `updated_at`; flag and link
//! writes leave it alone so bookkeeping never wins a last-write-wins check.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use timeflow_core::EventRepository;
use timeflow_domain::{Event, EventPatch, NewEvent, ProviderKind, Result, TimeFlowError};
use tokio::task;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::manager::DbManager;
use super::{from_millis, map_join_error, to_millis};
use crate::errors::InfraError;

const EVENT_COLUMNS: &str = "id, user_id, title, description, start_ts, end_ts, all_day,
     location, category, google_event_id, microsoft_event_id, synced_to_google,
     synced_to_microsoft, updated_at";

/// `(remote id column, synced flag column)` for a provider.
const fn provider_columns(provider: ProviderKind) -> (&'static str, &'static str) {
    match provider {
        ProviderKind::Google => ("google_event_id", "synced_to_google"),
        ProviderKind::Microsoft => ("microsoft_event_id", "synced_to_microsoft"),
    }
}

/// Local events stored in the `events` table.
pub struct SqliteEventRepository {
    db: Arc<DbManager>,
}

impl SqliteEventRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Run `work` against a pooled connection on the blocking pool.
    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> Result<T> {
            let conn = db.get_connection()?;
            work(&*conn)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn query_events(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(sql).map_err(InfraError::from)?;
    let rows = stmt
        .query_map(params, map_event_row)
        .map_err(InfraError::from)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(InfraError::from)?;
    Ok(rows)
}

fn find_event(conn: &Connection, event_id: &str) -> Result<Option<Event>> {
    let event = conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
            params![event_id],
            map_event_row,
        )
        .optional()
        .map_err(InfraError::from)?;
    Ok(event)
}

/// Run a single-row update; zero affected rows means the event is gone.
fn update_one(conn: &Connection, event_id: &str, sql: &str, params: &[&dyn ToSql]) -> Result<()> {
    let changed = conn.execute(sql, params).map_err(InfraError::from)?;
    if changed == 0 {
        return Err(TimeFlowError::NotFound(format!("event {event_id}")));
    }
    Ok(())
}

fn map_event_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        start: from_millis(4, row.get(4)?)?,
        end: from_millis(5, row.get(5)?)?,
        all_day: row.get(6)?,
        location: row.get(7)?,
        category: row.get(8)?,
        google_event_id: row.get(9)?,
        microsoft_event_id: row.get(10)?,
        synced_to_google: row.get(11)?,
        synced_to_microsoft: row.get(12)?,
        updated_at: from_millis(13, row.get(13)?)?,
    })
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn find_event(&self, event_id: &str) -> Result<Option<Event>> {
        let event_id = event_id.to_string();
        self.with_connection(move |conn| find_event(conn, &event_id)).await
    }

    #[instrument(skip(self))]
    async fn find_linked_events(
        &self,
        user_id: &str,
        provider: ProviderKind,
    ) -> Result<Vec<Event>> {
        let (remote_column, _) = provider_columns(provider);
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE user_id = ?1 AND {remote_column} IS NOT NULL"
        );
        let user_id = user_id.to_string();
        self.with_connection(move |conn| query_events(conn, &sql, &[&user_id as &dyn ToSql]))
            .await
    }

    #[instrument(skip(self))]
    async fn find_pending_export(
        &self,
        user_id: &str,
        provider: ProviderKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let (remote_column, synced_column) = provider_columns(provider);
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE user_id = ?1 AND start_ts >= ?2 AND start_ts <= ?3
               AND ({remote_column} IS NULL OR {synced_column} = 0)
             ORDER BY start_ts ASC"
        );
        let user_id = user_id.to_string();
        let (start, end) = (to_millis(start), to_millis(end));
        self.with_connection(move |conn| {
            query_events(conn, &sql, &[&user_id as &dyn ToSql, &start, &end])
        })
        .await
    }

    #[instrument(skip(self, new_event), fields(user_id = %new_event.user_id))]
    async fn insert_event(&self, new_event: &NewEvent) -> Result<Event> {
        let now = Utc::now();
        let event = Event {
            id: Uuid::now_v7().to_string(),
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
            updated_at: now,
        };

        let stored = self
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO events (
                        id, user_id, title, description, start_ts, end_ts, all_day, location,
                        category, google_event_id, microsoft_event_id, synced_to_google,
                        synced_to_microsoft, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                    params![
                        event.id,
                        event.user_id,
                        event.title,
                        event.description,
                        to_millis(event.start),
                        to_millis(event.end),
                        event.all_day,
                        event.location,
                        event.category,
                        event.google_event_id,
                        event.microsoft_event_id,
                        event.synced_to_google,
                        event.synced_to_microsoft,
                        to_millis(now),
                    ],
                )
                .map_err(InfraError::from)?;

                // Timestamps come back at stored (millisecond) precision.
                find_event(conn, &event.id)?.ok_or_else(|| {
                    TimeFlowError::Internal(format!("event {} missing after insert", event.id))
                })
            })
            .await?;

        debug!(event_id = %stored.id, "event inserted");
        Ok(stored)
    }

    #[instrument(skip(self, patch))]
    async fn apply_remote_update(
        &self,
        event_id: &str,
        provider: ProviderKind,
        patch: &EventPatch,
    ) -> Result<()> {
        let (_, synced_column) = provider_columns(provider);
        let sql = format!(
            "UPDATE events SET
                title = ?2, description = ?3, start_ts = ?4, end_ts = ?5, all_day = ?6,
                location = ?7, {synced_column} = 1, updated_at = ?8
             WHERE id = ?1"
        );
        let event_id = event_id.to_string();
        let patch = patch.clone();
        self.with_connection(move |conn| {
            update_one(
                conn,
                &event_id,
                &sql,
                &[
                    &event_id as &dyn ToSql,
                    &patch.title,
                    &patch.description,
                    &to_millis(patch.start),
                    &to_millis(patch.end),
                    &patch.all_day,
                    &patch.location,
                    &to_millis(Utc::now()),
                ],
            )
        })
        .await
    }

    async fn set_synced(&self, event_id: &str, provider: ProviderKind, synced: bool) -> Result<()> {
        let (_, synced_column) = provider_columns(provider);
        let sql = format!("UPDATE events SET {synced_column} = ?2 WHERE id = ?1");
        let event_id = event_id.to_string();
        self.with_connection(move |conn| {
            update_one(conn, &event_id, &sql, &[&event_id as &dyn ToSql, &synced])
        })
        .await
    }

    async fn link_remote_id(
        &self,
        event_id: &str,
        provider: ProviderKind,
        remote_id: &str,
    ) -> Result<()> {
        let (remote_column, synced_column) = provider_columns(provider);
        let sql =
            format!("UPDATE events SET {remote_column} = ?2, {synced_column} = 1 WHERE id = ?1");
        let event_id = event_id.to_string();
        let remote_id = remote_id.to_string();
        self.with_connection(move |conn| {
            update_one(conn, &event_id, &sql, &[&event_id as &dyn ToSql, &remote_id])
        })
        .await
    }

    async fn clear_sync_flags(&self, event_id: &str) -> Result<()> {
        let event_id = event_id.to_string();
        self.with_connection(move |conn| {
            update_one(
                conn,
                &event_id,
                "UPDATE events SET synced_to_google = 0, synced_to_microsoft = 0 WHERE id = ?1",
                &[&event_id as &dyn ToSql],
            )
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, event_id: &str) -> Result<bool> {
        let event_id = event_id.to_string();
        self.with_connection(move |conn| {
            let deleted = conn
                .execute("DELETE FROM events WHERE id = ?1", params![event_id])
                .map_err(InfraError::from)?;
            Ok(deleted > 0)
        })
        .await
    }
}
