//! Calendar provider connections and OAuth token material

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_wire_name_conversions;

/// External calendar service a user can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Microsoft,
}

impl_wire_name_conversions!(ProviderKind {
    Google => "google",
    Microsoft => "microsoft",
});

impl ProviderKind {
    /// Every supported provider, in sequential sync order.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Google, ProviderKind::Microsoft];
}

/// One row per (user, provider kind). At most one row per pair is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarProvider {
    pub id: String,
    pub user_id: String,
    pub provider: ProviderKind,
    /// Remote account the calendar belongs to.
    pub email: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl CalendarProvider {
    /// Whether the stored access token outlives `now + buffer`.
    ///
    /// A missing expiry counts as expired.
    pub fn token_valid_beyond(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        matches!(self.token_expires_at, Some(expiry) if expiry > now + buffer)
    }
}

/// Token endpoint response, shared by code exchange and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Providers may omit this on refresh; the stored one stays valid then.
    pub refresh_token: Option<String>,
    pub expires_in_seconds: i64,
}

impl TokenGrant {
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.expires_in_seconds)
    }
}

/// Values upserted on `(user_id, provider)` after a successful OAuth connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConnection {
    pub user_id: String,
    pub provider: ProviderKind,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: DateTime<Utc>,
}

/// Authorization-code callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub redirect_uri: String,
    /// PKCE verifier, when the flow used one.
    pub code_verifier: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_expiring_at(expiry: Option<DateTime<Utc>>) -> CalendarProvider {
        CalendarProvider {
            id: "p1".into(),
            user_id: "u1".into(),
            provider: ProviderKind::Google,
            email: None,
            access_token: Some("token".into()),
            refresh_token: Some("refresh".into()),
            token_expires_at: expiry,
            active: true,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn token_validity_uses_strict_buffer() {
        let now = Utc::now();
        let buffer = Duration::minutes(5);

        assert!(provider_expiring_at(Some(now + Duration::minutes(6)))
            .token_valid_beyond(now, buffer));
        assert!(!provider_expiring_at(Some(now + Duration::minutes(4)))
            .token_valid_beyond(now, buffer));
        assert!(!provider_expiring_at(Some(now + buffer)).token_valid_beyond(now, buffer));
        assert!(!provider_expiring_at(None).token_valid_beyond(now, buffer));
    }

    #[test]
    fn provider_kind_wire_names() {
        assert_eq!(ProviderKind::Google.as_str(), "google");
        assert_eq!("Microsoft".parse::<ProviderKind>().unwrap(), ProviderKind::Microsoft);
        assert_eq!(serde_json::to_string(&ProviderKind::Microsoft).unwrap(), "\"microsoft\"");
    }

    #[test]
    fn grant_expiry_is_relative_to_now() {
        let now = Utc::now();
        let grant = TokenGrant {
            access_token: "a".into(),
            refresh_token: None,
            expires_in_seconds: 3600,
        };
        assert_eq!(grant.expires_at(now), now + Duration::hours(1));
    }
}
