//! SQLite implementation of the `ProviderRepository` port.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use timeflow_core::ProviderRepository;
use timeflow_domain::{CalendarProvider, ProviderConnection, ProviderKind, Result, TimeFlowError};
use tokio::task;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::manager::DbManager;
use super::{from_millis, map_join_error, to_millis};
use crate::errors::InfraError;

const PROVIDER_COLUMNS: &str = "id, user_id, provider, email, access_token, refresh_token,
     token_expires_at, active, updated_at";

/// Provider connections stored in `calendar_providers`.
pub struct SqliteProviderRepository {
    db: Arc<DbManager>,
}

impl SqliteProviderRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

fn find_row(
    conn: &Connection,
    user_id: &str,
    provider: ProviderKind,
    active_only: bool,
) -> Result<Option<CalendarProvider>> {
    let sql = format!(
        "SELECT {PROVIDER_COLUMNS} FROM calendar_providers
         WHERE user_id = ?1 AND provider = ?2 {}",
        if active_only { "AND active = 1" } else { "" }
    );
    let row = conn
        .query_row(&sql, params![user_id, provider.as_str()], map_provider_row)
        .optional()
        .map_err(InfraError::from)?;
    Ok(row)
}

fn map_provider_row(row: &Row<'_>) -> rusqlite::Result<CalendarProvider> {
    let provider: String = row.get(2)?;
    let provider = provider.parse::<ProviderKind>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })?;
    let token_expires_at = row
        .get::<_, Option<i64>>(6)?
        .map(|millis| from_millis(6, millis))
        .transpose()?;

    Ok(CalendarProvider {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider,
        email: row.get(3)?,
        access_token: row.get(4)?,
        refresh_token: row.get(5)?,
        token_expires_at,
        active: row.get(7)?,
        updated_at: from_millis(8, row.get(8)?)?,
    })
}

#[async_trait]
impl ProviderRepository for SqliteProviderRepository {
    #[instrument(skip(self))]
    async fn find_active(
        &self,
        user_id: &str,
        provider: ProviderKind,
    ) -> Result<Option<CalendarProvider>> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();

        task::spawn_blocking(move || -> Result<Option<CalendarProvider>> {
            let conn = db.get_connection()?;
            find_row(&conn, &user_id, provider, true)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(
        skip(self, connection),
        fields(user_id = %connection.user_id, provider = %connection.provider)
    )]
    async fn upsert_connection(&self, connection: &ProviderConnection) -> Result<CalendarProvider> {
        let db = Arc::clone(&self.db);
        let connection = connection.clone();

        let row = task::spawn_blocking(move || -> Result<CalendarProvider> {
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO calendar_providers (
                    id, user_id, provider, email, access_token, refresh_token,
                    token_expires_at, active, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)
                ON CONFLICT(user_id, provider) DO UPDATE SET
                    email = COALESCE(excluded.email, calendar_providers.email),
                    access_token = excluded.access_token,
                    refresh_token =
                        COALESCE(excluded.refresh_token, calendar_providers.refresh_token),
                    token_expires_at = excluded.token_expires_at,
                    active = 1,
                    updated_at = excluded.updated_at",
                params![
                    Uuid::now_v7().to_string(),
                    connection.user_id,
                    connection.provider.as_str(),
                    connection.email,
                    connection.access_token,
                    connection.refresh_token,
                    to_millis(connection.token_expires_at),
                    to_millis(Utc::now()),
                ],
            )
            .map_err(InfraError::from)?;

            find_row(&conn, &connection.user_id, connection.provider, false)?.ok_or_else(|| {
                TimeFlowError::Internal("provider row missing right after upsert".into())
            })
        })
        .await
        .map_err(map_join_error)??;

        debug!("provider connection stored");
        Ok(row)
    }

    #[instrument(skip(self, access_token, refresh_token))]
    async fn update_tokens(
        &self,
        user_id: &str,
        provider: ProviderKind,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();
        let access_token = access_token.to_string();
        let refresh_token = refresh_token.map(str::to_string);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    "UPDATE calendar_providers SET
                        access_token = ?3,
                        refresh_token = COALESCE(?4, refresh_token),
                        token_expires_at = ?5,
                        updated_at = ?6
                     WHERE user_id = ?1 AND provider = ?2",
                    params![
                        user_id,
                        provider.as_str(),
                        access_token,
                        refresh_token,
                        to_millis(expires_at),
                        to_millis(Utc::now()),
                    ],
                )
                .map_err(InfraError::from)?;

            if changed == 0 {
                return Err(TimeFlowError::NotFound(format!(
                    "{provider} connection for {user_id}"
                )));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn deactivate(&self, user_id: &str, provider: ProviderKind) -> Result<()> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE calendar_providers SET active = 0, updated_at = ?3
                 WHERE user_id = ?1 AND provider = ?2",
                params![user_id, provider.as_str(), to_millis(Utc::now())],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn touch(&self, user_id: &str, provider: ProviderKind) -> Result<()> {
        let db = Arc::clone(&self.db);
        let user_id = user_id.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE calendar_providers SET updated_at = ?3
                 WHERE user_id = ?1 AND provider = ?2",
                params![user_id, provider.as_str(), to_millis(Utc::now())],
            )
            .map_err(InfraError::from)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}
