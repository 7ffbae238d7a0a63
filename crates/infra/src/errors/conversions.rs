//! Conversions from external infrastructure errors into domain errors.

use r2d2::Error as PoolError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use timeflow_domain::TimeFlowError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TimeFlowError);

impl From<InfraError> for TimeFlowError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TimeFlowError> for InfraError {
    fn from(value: TimeFlowError) -> Self {
        InfraError(value)
    }
}

trait IntoTimeFlowError {
    fn into_timeflow(self) -> TimeFlowError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → TimeFlowError */
/* -------------------------------------------------------------------------- */

impl IntoTimeFlowError for SqlError {
    fn into_timeflow(self) -> TimeFlowError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        TimeFlowError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        TimeFlowError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067) => {
                        TimeFlowError::Database(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, 275) => {
                        TimeFlowError::Database(format!("check constraint violation: {message}"))
                    }
                    _ => TimeFlowError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => TimeFlowError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                TimeFlowError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                TimeFlowError::Database(format!("invalid column type for {name}: {ty}"))
            }
            RE::InvalidPath(path) => TimeFlowError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => TimeFlowError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_timeflow())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → TimeFlowError */
/* -------------------------------------------------------------------------- */

impl IntoTimeFlowError for PoolError {
    fn into_timeflow(self) -> TimeFlowError {
        TimeFlowError::Database(format!("connection pool error: {self}"))
    }
}

impl From<PoolError> for InfraError {
    fn from(value: PoolError) -> Self {
        InfraError(value.into_timeflow())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TimeFlowError */
/* -------------------------------------------------------------------------- */

impl IntoTimeFlowError for HttpError {
    fn into_timeflow(self) -> TimeFlowError {
        if self.is_timeout() {
            return TimeFlowError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return TimeFlowError::Network("HTTP connection failure".into());
        }

        if self.is_decode() {
            return TimeFlowError::InvalidInput(format!("malformed response body: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => TimeFlowError::Auth(message),
                404 => TimeFlowError::NotFound(message),
                429 => TimeFlowError::Network(message),
                400..=499 => TimeFlowError::InvalidInput(message),
                _ => TimeFlowError::Network(message),
            };
        }

        TimeFlowError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_timeflow())
    }
}
