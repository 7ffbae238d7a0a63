//! Sync orchestration across every connected provider
//!
//! One [`SyncManager`] per user session, owned by the composition root. It is
//! the only component that runs reconciliation:
//! - single-flight: a `sync_all` arriving while another runs returns a skipped
//!   result without doing any work
//! - parallel or sequential provider passes
//! - interval auto-sync and debounced post-edit syncs
//! - completion listeners, notified synchronously in registration order

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use timeflow_domain::constants::DEFAULT_DEBOUNCE_MS;
use timeflow_domain::{
    ProviderKind, ProviderSyncReport, SyncConfig, SyncError, SyncManagerResult, TimeFlowError,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::ports::{EventRepository, ProviderRepository, ProviderSync};

type SyncListener = dyn Fn(&SyncManagerResult) + Send + Sync;
type ListenerList = Mutex<Vec<(u64, Arc<SyncListener>)>>;

/// Tunables for [`SyncManager`].
#[derive(Debug, Clone)]
pub struct SyncManagerOptions {
    /// Quiet period before a post-edit sync runs.
    pub debounce: Duration,
    /// How long `shutdown` waits for the auto-sync task to finish.
    pub shutdown_timeout: Duration,
}

impl Default for SyncManagerOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

struct AutoSyncTask {
    cancellation: CancellationToken,
    handle: JoinHandle<()>,
}

/// Handle returned by [`SyncManager::on_sync_complete`].
///
/// Dropping it keeps the listener registered; call
/// [`SyncSubscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct SyncSubscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl SyncSubscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

/// Clears the in-progress flag on every exit path.
struct InProgressGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InProgressGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Orchestrates provider adapters for one user.
pub struct SyncManager {
    user_id: String,
    adapters: Vec<Arc<dyn ProviderSync>>,
    providers: Arc<dyn ProviderRepository>,
    events: Arc<dyn EventRepository>,
    options: SyncManagerOptions,
    in_progress: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    listeners: Arc<ListenerList>,
    next_listener_id: AtomicU64,
    auto_sync: Mutex<Option<AutoSyncTask>>,
    debounce_generation: Arc<AtomicU64>,
}

impl SyncManager {
    /// Adapters run in the order given when syncing sequentially.
    pub fn new(
        user_id: impl Into<String>,
        adapters: Vec<Arc<dyn ProviderSync>>,
        providers: Arc<dyn ProviderRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            adapters,
            providers,
            events,
            options: SyncManagerOptions::default(),
            in_progress: AtomicBool::new(false),
            last_sync: Mutex::new(None),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(0),
            auto_sync: Mutex::new(None),
            debounce_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_options(mut self, options: SyncManagerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_sync_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Completion time of the last `sync_all` that actually ran.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock()
    }

    /// Register a listener called with every completed aggregate result.
    pub fn on_sync_complete<F>(&self, listener: F) -> SyncSubscription
    where
        F: Fn(&SyncManagerResult) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        SyncSubscription { id, listeners: Arc::downgrade(&self.listeners) }
    }

    fn notify_listeners(&self, result: &SyncManagerResult) {
        // Listeners may (un)subscribe from inside the callback.
        let listeners: Vec<Arc<SyncListener>> =
            self.listeners.lock().iter().map(|(_, listener)| Arc::clone(listener)).collect();
        for listener in listeners {
            if std::panic::catch_unwind(AssertUnwindSafe(|| listener(result))).is_err() {
                warn!("sync listener panicked");
            }
        }
    }

    /// Sync every selected provider.
    ///
    /// Never fails: provider-level problems are folded into that provider's
    /// slot with `success = false`.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn sync_all(&self, config: SyncConfig) -> SyncManagerResult {
        let Some(_guard) = InProgressGuard::acquire(&self.in_progress) else {
            info!("sync already running, skipping");
            return SyncManagerResult::skipped();
        };

        info!(parallel = config.parallel, "starting sync");

        let mut reports = Vec::with_capacity(self.adapters.len());
        let mut selected = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let provider = adapter.provider();
            match self.should_sync(provider, &config).await {
                Ok(true) => selected.push(Arc::clone(adapter)),
                Ok(false) => debug!(provider = %provider, "provider not selected"),
                Err(err) => {
                    error!(
                        provider = %provider,
                        error = %err,
                        "failed to check provider connection"
                    );
                    reports.push((provider, ProviderSyncReport::from_error(err)));
                }
            }
        }

        if config.parallel {
            let runs = selected.iter().map(|adapter| self.run_provider(adapter.as_ref()));
            reports.extend(join_all(runs).await);
        } else {
            for adapter in &selected {
                reports.push(self.run_provider(adapter.as_ref()).await);
            }
        }

        let result = SyncManagerResult::from_reports(reports);
        *self.last_sync.lock() = Some(Utc::now());
        self.notify_listeners(&result);

        info!(
            overall_success = result.overall_success,
            created = result.total_created(),
            updated = result.total_updated(),
            "sync completed"
        );
        result
    }

    async fn should_sync(
        &self,
        provider: ProviderKind,
        config: &SyncConfig,
    ) -> Result<bool, SyncError> {
        if let Some(enabled) = config.override_for(provider) {
            return Ok(enabled);
        }
        Ok(self.providers.find_active(&self.user_id, provider).await?.is_some())
    }

    async fn run_provider(&self, adapter: &dyn ProviderSync) -> (ProviderKind, ProviderSyncReport) {
        let provider = adapter.provider();
        let outcome = AssertUnwindSafe(adapter.sync(&self.user_id)).catch_unwind().await;

        let report = match outcome {
            Ok(Ok(report)) => {
                if !report.success {
                    warn!(
                        provider = %provider,
                        import_errors = report.to_local.errors().len(),
                        export_errors = report.to_remote.errors().len(),
                        "provider sync finished with errors"
                    );
                }
                report
            }
            Ok(Err(err)) => {
                error!(provider = %provider, error = %err, "provider sync failed");
                ProviderSyncReport::from_error(err)
            }
            Err(_) => {
                error!(provider = %provider, "provider sync panicked");
                ProviderSyncReport::failed(format!("{provider} sync panicked"))
            }
        };
        (provider, report)
    }

    /// Start syncing every `interval_minutes`, sequentially.
    ///
    /// Runs one sync right away. Starting again replaces the running schedule.
    pub fn start_auto_sync(self: &Arc<Self>, interval_minutes: u64) -> Result<(), TimeFlowError> {
        let period = Duration::from_secs(interval_minutes.saturating_mul(60));
        self.start_auto_sync_every(period)
    }

    /// [`start_auto_sync`](Self::start_auto_sync) with an arbitrary period.
    pub fn start_auto_sync_every(self: &Arc<Self>, period: Duration) -> Result<(), TimeFlowError> {
        if period.is_zero() {
            return Err(TimeFlowError::InvalidInput("auto-sync interval must be positive".into()));
        }
        let runtime = current_runtime()?;

        self.stop_auto_sync();

        let cancellation = CancellationToken::new();
        let token = cancellation.clone();
        let manager = Arc::downgrade(self);

        let handle = runtime.spawn(async move {
            loop {
                if token.is_cancelled() {
                    break;
                }
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let result = manager.sync_all(SyncConfig::sequential()).await;
                drop(manager);
                debug!(
                    skipped = result.skipped,
                    overall_success = result.overall_success,
                    "auto-sync tick done"
                );

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }
            }
            debug!("auto-sync loop exited");
        });

        *self.auto_sync.lock() = Some(AutoSyncTask { cancellation, handle });
        info!(period_secs = period.as_secs(), "auto-sync started");
        Ok(())
    }

    /// Stop the auto-sync schedule. A sync already in flight completes.
    pub fn stop_auto_sync(&self) {
        if let Some(task) = self.auto_sync.lock().take() {
            task.cancellation.cancel();
            info!("auto-sync stopped");
        }
    }

    pub fn is_auto_sync_running(&self) -> bool {
        self.auto_sync.lock().as_ref().is_some_and(|task| !task.handle.is_finished())
    }

    /// Stop auto-sync and wait for its task to exit.
    pub async fn shutdown(&self) -> Result<(), TimeFlowError> {
        self.debounce_generation.fetch_add(1, Ordering::AcqRel);
        let Some(task) = self.auto_sync.lock().take() else {
            return Ok(());
        };
        task.cancellation.cancel();

        match tokio::time::timeout(self.options.shutdown_timeout, task.handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => {
                Err(TimeFlowError::Internal(format!("auto-sync task failed: {join_err}")))
            }
            Err(_) => Err(TimeFlowError::Internal(format!(
                "auto-sync task did not stop within {}s",
                self.options.shutdown_timeout.as_secs()
            ))),
        }
    }

    /// Mark a locally edited event as needing sync and schedule a debounced
    /// parallel sync.
    ///
    /// No-op while a sync is running: the change is picked up by the next
    /// cycle. Each call restarts the debounce timer, so a burst of edits
    /// produces a single sync.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn sync_after_event_change(
        self: &Arc<Self>,
        event_id: &str,
    ) -> Result<(), SyncError> {
        if self.is_sync_in_progress() {
            debug!("sync in progress, change will be picked up next cycle");
            return Ok(());
        }

        if self.events.find_event(event_id).await?.is_none() {
            debug!("event not found, nothing to sync");
            return Ok(());
        }
        self.events.clear_sync_flags(event_id).await?;

        self.schedule_debounced_sync()
            .map_err(|err| SyncError::Store { message: err.to_string() })
    }

    fn schedule_debounced_sync(self: &Arc<Self>) -> Result<(), TimeFlowError> {
        let runtime = current_runtime()?;
        let generation = self.debounce_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let latest = Arc::clone(&self.debounce_generation);
        let manager = Arc::downgrade(self);
        let delay = self.options.debounce;

        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if latest.load(Ordering::Acquire) != generation {
                return;
            }
            if let Some(manager) = manager.upgrade() {
                manager.sync_all(SyncConfig::parallel()).await;
            }
        });
        debug!(?delay, "debounced sync scheduled");
        Ok(())
    }

    /// Delete an event locally after best-effort deletion on every linked
    /// provider. Returns whether the event existed.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn delete_event(&self, event_id: &str) -> Result<bool, SyncError> {
        let Some(event) = self.events.find_event(event_id).await? else {
            return Ok(false);
        };

        for adapter in &self.adapters {
            if let Err(err) = adapter.delete_remote(&self.user_id, &event).await {
                warn!(
                    provider = %adapter.provider(),
                    error = %err,
                    "remote delete failed, deleting locally anyway"
                );
            }
        }

        Ok(self.events.delete_event(event_id).await?)
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        if let Some(task) = self.auto_sync.get_mut().take() {
            warn!("SyncManager dropped with auto-sync running, cancelling");
            task.cancellation.cancel();
        }
    }
}

fn current_runtime() -> Result<Handle, TimeFlowError> {
    Handle::try_current()
        .map_err(|err| TimeFlowError::Internal(format!("no tokio runtime available: {err}")))
}
