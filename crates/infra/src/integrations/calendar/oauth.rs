//! OAuth 2.0 token endpoint client (authorization code + refresh grants)

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use timeflow_core::OAuthTokenClient;
use timeflow_domain::{
    AuthorizationCode, OAuthClientConfig, ProviderKind, SyncError, TimeFlowError, TokenGrant,
};
use tracing::{debug, instrument, warn};

use super::transport::{Transport, TransportError};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const MICROSOFT_SCOPES: &str = "Calendars.ReadWrite offline_access User.Read";
/// Lifetime assumed when a token response omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Client registration and endpoint for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub token_url: String,
    /// Space-separated; sent with every grant when non-empty.
    pub scopes: Option<String>,
}

impl OAuthSettings {
    pub fn google(config: &OAuthClientConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: GOOGLE_TOKEN_URL.into(),
            scopes: None,
        }
    }

    pub fn microsoft(config: &OAuthClientConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_url: MICROSOFT_TOKEN_URL.into(),
            scopes: Some(MICROSOFT_SCOPES.into()),
        }
    }

    pub fn for_provider(provider: ProviderKind, config: &OAuthClientConfig) -> Self {
        match provider {
            ProviderKind::Google => Self::google(config),
            ProviderKind::Microsoft => Self::microsoft(config),
        }
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

/// Token endpoint client for one provider.
pub struct HttpOAuthClient {
    provider: ProviderKind,
    settings: OAuthSettings,
    transport: Transport,
}

impl HttpOAuthClient {
    pub fn new(
        provider: ProviderKind,
        settings: OAuthSettings,
        timeout: Duration,
    ) -> Result<Self, TimeFlowError> {
        Ok(Self { provider, settings, transport: Transport::new(timeout)? })
    }

    fn form(&self, grant: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        let mut params = grant;
        params.push(("client_id", self.settings.client_id.clone()));
        if let Some(secret) = &self.settings.client_secret {
            params.push(("client_secret", secret.clone()));
        }
        if let Some(scopes) = self.settings.scopes.as_ref().filter(|s| !s.is_empty()) {
            params.push(("scope", scopes.clone()));
        }
        params
    }

    async fn post_grant(
        &self,
        params: Vec<(&'static str, String)>,
    ) -> Result<TokenResponse, GrantFailure> {
        let request = self.transport.client().post(&self.settings.token_url).form(&params);
        self.transport.send_json(request).await.map_err(GrantFailure::from)
    }
}

#[async_trait]
impl OAuthTokenClient for HttpOAuthClient {
    fn provider(&self) -> ProviderKind {
        self.provider
    }

    #[instrument(skip(self, code), fields(provider = %self.provider))]
    async fn exchange_authorization_code(
        &self,
        code: &AuthorizationCode,
    ) -> Result<TokenGrant, SyncError> {
        let mut grant = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.code.clone()),
            ("redirect_uri", code.redirect_uri.clone()),
        ];
        if let Some(verifier) = &code.code_verifier {
            grant.push(("code_verifier", verifier.clone()));
        }

        let response = self.post_grant(self.form(grant)).await.map_err(|failure| {
            warn!(error = %failure, "authorization code exchange failed");
            SyncError::AuthorizationFailed { provider: self.provider, message: failure.to_string() }
        })?;

        debug!("authorization code exchanged");
        Ok(response.into())
    }

    #[instrument(skip(self, refresh_token), fields(provider = %self.provider))]
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, SyncError> {
        let grant = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];

        match self.post_grant(self.form(grant)).await {
            Ok(response) => {
                debug!(rotated = response.refresh_token.is_some(), "access token refreshed");
                Ok(response.into())
            }
            Err(failure) if failure.is_invalid_grant() => {
                Err(SyncError::InvalidGrant {
                    provider: self.provider,
                    message: failure.to_string(),
                })
            }
            Err(failure) => {
                Err(SyncError::RefreshFailed {
                    provider: self.provider,
                    message: failure.to_string(),
                })
            }
        }
    }
}

/// Standard OAuth 2.0 error response (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    error_description: Option<String>,
}

impl fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => write!(f, "{}", self.error),
        }
    }
}

enum GrantFailure {
    Rejected { status: u16, body: OAuthErrorBody },
    Transport(TransportError),
}

impl GrantFailure {
    fn is_invalid_grant(&self) -> bool {
        matches!(self, Self::Rejected { body, .. } if body.error == "invalid_grant")
    }
}

impl From<TransportError> for GrantFailure {
    fn from(err: TransportError) -> Self {
        if let TransportError::Status { status, body } = &err {
            if let Ok(body) = serde_json::from_str::<OAuthErrorBody>(body) {
                return Self::Rejected { status: *status, body };
            }
        }
        Self::Transport(err)
    }
}

impl fmt::Display for GrantFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Transport(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl From<TokenResponse> for TokenGrant {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|token| !token.is_empty()),
            expires_in_seconds: response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        }
    }
}
