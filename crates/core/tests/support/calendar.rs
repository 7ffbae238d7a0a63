use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use timeflow_core::{OAuthTokenClient, ProviderSync, RemoteCalendarClient, TokenSource};
use timeflow_domain::{
    AuthorizationCode, Event, ProviderKind, ProviderSyncReport, RemoteEvent, RemoteEventEntry,
    SyncDirection, SyncError, SyncResult, TokenGrant,
};

/// Remote calendar double that serves a scripted event list.
pub struct FakeRemoteClient {
    provider: ProviderKind,
    entries: Mutex<Vec<RemoteEventEntry>>,
    fetch_error: Mutex<Option<SyncError>>,
    pub fetch_calls: AtomicUsize,
    pub fetch_windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    pub created: Mutex<Vec<String>>,
    pub updated: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    next_remote_id: AtomicUsize,
}

impl FakeRemoteClient {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            entries: Mutex::new(Vec::new()),
            fetch_error: Mutex::new(None),
            fetch_calls: AtomicUsize::new(0),
            fetch_windows: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            next_remote_id: AtomicUsize::new(0),
        }
    }

    pub fn serve(&self, events: Vec<RemoteEvent>) {
        *self.entries.lock().unwrap() = events.into_iter().map(Ok).collect();
    }

    pub fn serve_entries(&self, entries: Vec<RemoteEventEntry>) {
        *self.entries.lock().unwrap() = entries;
    }

    pub fn fail_fetch_with(&self, error: SyncError) {
        *self.fetch_error.lock().unwrap() = Some(error);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteCalendarClient for FakeRemoteClient {
    fn provider(&self) -> ProviderKind {
        self.provider
    }

    async fn fetch_events(
        &self,
        _access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEventEntry>, SyncError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_windows.lock().unwrap().push((start, end));
        if let Some(err) = self.fetch_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    async fn create_event(&self, _access_token: &str, event: &Event) -> Result<String, SyncError> {
        let n = self.next_remote_id.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push(event.id.clone());
        Ok(format!("{}-remote-{n}", self.provider))
    }

    async fn update_event(
        &self,
        _access_token: &str,
        remote_id: &str,
        _event: &Event,
    ) -> Result<(), SyncError> {
        self.updated.lock().unwrap().push(remote_id.to_string());
        Ok(())
    }

    async fn delete_event(&self, _access_token: &str, remote_id: &str) -> Result<(), SyncError> {
        self.deleted.lock().unwrap().push(remote_id.to_string());
        Ok(())
    }
}

/// Token source answering from a fixed table.
#[derive(Default)]
pub struct StaticTokenSource {
    answers: Mutex<HashMap<ProviderKind, Result<Option<String>, SyncError>>>,
}

impl StaticTokenSource {
    pub fn connected(providers: &[ProviderKind]) -> Self {
        let source = Self::default();
        for provider in providers {
            source.answer(*provider, Ok(Some(format!("{provider}-token"))));
        }
        source
    }

    pub fn answer(&self, provider: ProviderKind, answer: Result<Option<String>, SyncError>) {
        self.answers.lock().unwrap().insert(provider, answer);
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn get_valid_token(
        &self,
        _user_id: &str,
        provider: ProviderKind,
    ) -> Result<Option<String>, SyncError> {
        self.answers.lock().unwrap().get(&provider).cloned().unwrap_or(Ok(None))
    }
}

/// Token endpoint double with a scripted refresh answer.
pub struct FakeOAuthClient {
    provider: ProviderKind,
    refresh_answer: Mutex<Result<TokenGrant, SyncError>>,
    pub refresh_calls: AtomicUsize,
    pub refreshed_with: Mutex<Vec<String>>,
}

impl FakeOAuthClient {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            refresh_answer: Mutex::new(Ok(grant("refreshed-access", None, 3600))),
            refresh_calls: AtomicUsize::new(0),
            refreshed_with: Mutex::new(Vec::new()),
        }
    }

    pub fn answer_refresh(&self, answer: Result<TokenGrant, SyncError>) {
        *self.refresh_answer.lock().unwrap() = answer;
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

pub fn grant(access: &str, refresh: Option<&str>, expires_in: i64) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_in_seconds: expires_in,
    }
}

#[async_trait]
impl OAuthTokenClient for FakeOAuthClient {
    fn provider(&self) -> ProviderKind {
        self.provider
    }

    async fn exchange_authorization_code(
        &self,
        code: &AuthorizationCode,
    ) -> Result<TokenGrant, SyncError> {
        Ok(grant(&format!("access-for-{}", code.code), Some("fresh-refresh"), 3600))
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, SyncError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refreshed_with.lock().unwrap().push(refresh_token.to_string());
        self.refresh_answer.lock().unwrap().clone()
    }
}

/// How a scripted provider pass behaves.
#[derive(Clone)]
pub enum Script {
    Succeed,
    SucceedWithErrors,
    Fail,
    Revoked,
    Panic,
}

/// `ProviderSync` double that counts calls and records the order of
/// starts/finishes in a shared log.
pub struct ScriptedProviderSync {
    provider: ProviderKind,
    script: Mutex<Script>,
    delay: Duration,
    pub calls: AtomicUsize,
    log: Arc<Mutex<Vec<String>>>,
    pub remote_deletes: Mutex<Vec<String>>,
}

impl ScriptedProviderSync {
    pub fn new(provider: ProviderKind, delay: Duration, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            provider,
            script: Mutex::new(Script::Succeed),
            delay,
            calls: AtomicUsize::new(0),
            log,
            remote_deletes: Mutex::new(Vec::new()),
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderSync for ScriptedProviderSync {
    fn provider(&self) -> ProviderKind {
        self.provider
    }

    async fn sync(&self, _user_id: &str) -> Result<ProviderSyncReport, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("{}:start", self.provider));
        tokio::time::sleep(self.delay).await;
        self.log.lock().unwrap().push(format!("{}:end", self.provider));

        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Succeed => Ok(ProviderSyncReport::new(
                SyncResult::empty(SyncDirection::ToLocal),
                SyncResult::empty(SyncDirection::ToRemote),
            )),
            Script::SucceedWithErrors => Ok(ProviderSyncReport::new(
                SyncResult::aborted(
                    SyncDirection::ToLocal,
                    "failed to write event for remote id r1",
                ),
                SyncResult::empty(SyncDirection::ToRemote),
            )),
            Script::Fail => Err(SyncError::RemoteFetchFailed {
                provider: self.provider,
                message: "HTTP 503".to_string(),
            }),
            Script::Revoked => Err(SyncError::InvalidGrant {
                provider: self.provider,
                message: "invalid_grant".to_string(),
            }),
            Script::Panic => panic!("adapter blew up"),
        }
    }

    async fn delete_remote(&self, _user_id: &str, event: &Event) -> Result<(), SyncError> {
        match event.remote_id(self.provider) {
            Some(remote_id) => {
                self.remote_deletes.lock().unwrap().push(remote_id.to_string());
                Err(SyncError::RemoteWriteFailed {
                    provider: self.provider,
                    message: "remote unavailable".to_string(),
                })
            }
            None => Ok(()),
        }
    }
}
