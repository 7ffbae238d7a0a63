//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ProviderKind;

/// Main error type for TimeFlow
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum TimeFlowError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for TimeFlow operations
pub type Result<T> = std::result::Result<T, TimeFlowError>;

/// Failures surfaced by token handling, remote clients, and the sync adapters.
///
/// Connection-level variants ([`SyncError::requires_reconnect`]) mean the user
/// has to reconnect the provider. Everything else is retried by the next sync
/// cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncError {
    #[error("{provider} calendar is not connected")]
    NotConnected { provider: ProviderKind },

    #[error("no {provider} refresh token stored, please reconnect the calendar")]
    NoRefreshToken { provider: ProviderKind },

    #[error("{provider} revoked the grant, please reconnect the calendar: {message}")]
    InvalidGrant { provider: ProviderKind, message: String },

    #[error("{provider} token refresh failed: {message}")]
    RefreshFailed { provider: ProviderKind, message: String },

    #[error("{provider} authorization code exchange failed: {message}")]
    AuthorizationFailed { provider: ProviderKind, message: String },

    #[error("no valid {provider} access token available: {message}")]
    TokenUnavailable { provider: ProviderKind, message: String },

    #[error("failed to fetch {provider} events: {message}")]
    RemoteFetchFailed { provider: ProviderKind, message: String },

    #[error("failed to write {provider} event: {message}")]
    RemoteWriteFailed { provider: ProviderKind, message: String },

    #[error("failed to write event for remote id {remote_id}: {message}")]
    PerEventWriteFailed { remote_id: String, message: String },

    #[error("local store error: {message}")]
    Store { message: String },
}

impl SyncError {
    /// True when the only way forward is reconnecting the provider.
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            Self::NotConnected { .. } | Self::NoRefreshToken { .. } | Self::InvalidGrant { .. }
        )
    }
}

impl From<TimeFlowError> for SyncError {
    fn from(err: TimeFlowError) -> Self {
        Self::Store { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_is_required_only_for_connection_level_errors() {
        let provider = ProviderKind::Google;

        assert!(SyncError::NotConnected { provider }.requires_reconnect());
        assert!(SyncError::NoRefreshToken { provider }.requires_reconnect());
        assert!(SyncError::InvalidGrant { provider, message: "revoked".into() }
            .requires_reconnect());

        assert!(!SyncError::RefreshFailed { provider, message: "503".into() }.requires_reconnect());
        assert!(!SyncError::RemoteFetchFailed { provider, message: "timeout".into() }
            .requires_reconnect());
    }

    #[test]
    fn messages_name_the_provider() {
        let err = SyncError::RemoteFetchFailed {
            provider: ProviderKind::Microsoft,
            message: "HTTP 503".into(),
        };
        assert_eq!(err.to_string(), "failed to fetch microsoft events: HTTP 503");
    }

    #[test]
    fn store_errors_keep_the_domain_message() {
        let err: SyncError = TimeFlowError::Database("database is locked".into()).into();
        assert_eq!(err.to_string(), "local store error: Database error: database is locked");
    }
}
