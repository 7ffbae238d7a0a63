//! Time-bounded HTTP transport shared by the provider clients.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use timeflow_domain::TimeFlowError;
use tracing::debug;

use crate::errors::InfraError;

/// Longest slice of an error body carried into error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Why a request did not produce a usable response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Http(TimeFlowError),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(InfraError::from(err).into())
    }
}

/// Reqwest client plus the per-request deadline applied to every call.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    timeout: Duration,
}

impl Transport {
    pub fn new(timeout: Duration) -> Result<Self, TimeFlowError> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|err| TimeFlowError::from(InfraError::from(err)))?;

        Ok(Self { client, timeout })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute the request. Non-2xx statuses become [`TransportError::Status`].
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let request = builder.build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending HTTP request");

        let response = tokio::time::timeout(self.timeout, self.client.execute(request))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        let status = response.status();
        debug!(%method, %url, %status, "received HTTP response");

        if status.is_success() {
            return Ok(response);
        }

        let body = tokio::time::timeout(self.timeout, response.text())
            .await
            .ok()
            .and_then(|body| body.ok())
            .unwrap_or_default();
        Err(TransportError::Status { status: status.as_u16(), body: truncate(body) })
    }

    /// Execute the request and decode a JSON body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = self.send(builder).await?;
        let bytes = tokio::time::timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        serde_json::from_slice(&bytes).map_err(|err| TransportError::Decode(err.to_string()))
    }

    /// Execute the request, discarding any body.
    pub async fn send_empty(&self, builder: RequestBuilder) -> Result<StatusCode, TransportError> {
        self.send(builder).await.map(|response| response.status())
    }
}

fn truncate(body: String) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body;
    }
    let mut short: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    short.push_str("...");
    short
}
