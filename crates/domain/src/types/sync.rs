//! Sync results, requests, and the reconciliation window

use std::fmt::Display;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use super::provider::ProviderKind;
use crate::errors::SyncError;
use crate::impl_wire_name_conversions;

/// Which way a sync pass moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Provider events imported into the local store.
    ToLocal,
    /// Local changes exported to the provider.
    ToRemote,
}

impl_wire_name_conversions!(SyncDirection {
    ToLocal => "to_local",
    ToRemote => "to_remote",
});

/// Which halves of the reconciliation an adapter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Export always yields an empty result without touching the provider.
    #[default]
    ImportOnly,
    Bidirectional,
}

impl SyncMode {
    pub fn exports(&self) -> bool {
        matches!(self, Self::Bidirectional)
    }
}

/// Time range fetched from providers on each pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// `months` before and after `now`.
    pub fn around(now: DateTime<Utc>, months: u32) -> Self {
        let span = Months::new(months);
        Self {
            start: now.checked_sub_months(span).unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: now.checked_add_months(span).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Outcome of one adapter pass in one direction. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    direction: SyncDirection,
    created: u32,
    updated: u32,
    /// Local events whose remote counterpart disappeared and were marked unsynced.
    unsynced: u32,
    errors: Vec<String>,
    /// The error that stopped the pass before any event was processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fatal: Option<SyncError>,
    timestamp: DateTime<Utc>,
}

impl SyncResult {
    /// Zero counts, zero errors.
    pub fn empty(direction: SyncDirection) -> Self {
        SyncTally::new(direction).finish()
    }

    /// A pass that stopped before processing any event.
    pub fn aborted(direction: SyncDirection, reason: impl Display) -> Self {
        let mut tally = SyncTally::new(direction);
        tally.record_error(reason);
        tally.finish()
    }

    /// A pass stopped by `error`, kept typed so callers can tell a revoked
    /// connection from a transient failure.
    pub fn interrupted(direction: SyncDirection, error: SyncError) -> Self {
        let mut result = Self::aborted(direction, &error);
        result.fatal = Some(error);
        result
    }

    pub fn direction(&self) -> SyncDirection {
        self.direction
    }

    pub fn created(&self) -> u32 {
        self.created
    }

    pub fn updated(&self) -> u32 {
        self.updated
    }

    pub fn unsynced(&self) -> u32 {
        self.unsynced
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn fatal(&self) -> Option<&SyncError> {
        self.fatal.as_ref()
    }

    pub fn requires_reconnect(&self) -> bool {
        self.fatal.as_ref().is_some_and(SyncError::requires_reconnect)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Mutable counters an adapter accumulates before producing a [`SyncResult`].
#[derive(Debug)]
pub struct SyncTally {
    direction: SyncDirection,
    created: u32,
    updated: u32,
    unsynced: u32,
    errors: Vec<String>,
}

impl SyncTally {
    pub fn new(direction: SyncDirection) -> Self {
        Self { direction, created: 0, updated: 0, unsynced: 0, errors: Vec::new() }
    }

    pub fn record_created(&mut self) {
        self.created += 1;
    }

    pub fn record_updated(&mut self) {
        self.updated += 1;
    }

    pub fn record_unsynced(&mut self) {
        self.unsynced += 1;
    }

    pub fn record_error(&mut self, error: impl Display) {
        self.errors.push(error.to_string());
    }

    pub fn finish(self) -> SyncResult {
        SyncResult {
            direction: self.direction,
            created: self.created,
            updated: self.updated,
            unsynced: self.unsynced,
            errors: self.errors,
            fatal: None,
            timestamp: Utc::now(),
        }
    }
}

/// Both directions for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSyncReport {
    pub to_local: SyncResult,
    pub to_remote: SyncResult,
    /// Zero errors across both directions.
    pub success: bool,
    /// The connection is gone (revoked grant, missing refresh token, no
    /// active row) and the user has to reconnect this provider.
    #[serde(default)]
    pub reconnect_required: bool,
}

impl ProviderSyncReport {
    pub fn new(to_local: SyncResult, to_remote: SyncResult) -> Self {
        let success = to_local.is_clean() && to_remote.is_clean();
        let reconnect_required = to_local.requires_reconnect() || to_remote.requires_reconnect();
        Self { to_local, to_remote, success, reconnect_required }
    }

    /// Slot for a provider whose whole pass failed.
    pub fn failed(reason: impl Display) -> Self {
        Self::new(
            SyncResult::aborted(SyncDirection::ToLocal, reason),
            SyncResult::empty(SyncDirection::ToRemote),
        )
    }

    /// Slot for a provider whose pass returned `error` instead of a report.
    pub fn from_error(error: SyncError) -> Self {
        Self::new(
            SyncResult::interrupted(SyncDirection::ToLocal, error),
            SyncResult::empty(SyncDirection::ToRemote),
        )
    }
}

/// Aggregate result of one `sync_all` call, keyed by provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncManagerResult {
    pub google: Option<ProviderSyncReport>,
    pub microsoft: Option<ProviderSyncReport>,
    pub overall_success: bool,
    /// Set when the call was dropped because another sync was running.
    pub skipped: bool,
    pub timestamp: DateTime<Utc>,
}

impl SyncManagerResult {
    pub fn skipped() -> Self {
        Self {
            google: None,
            microsoft: None,
            overall_success: true,
            skipped: true,
            timestamp: Utc::now(),
        }
    }

    /// Builds the aggregate; overall success requires every slot to succeed.
    pub fn from_reports(
        reports: impl IntoIterator<Item = (ProviderKind, ProviderSyncReport)>,
    ) -> Self {
        let mut result = Self {
            google: None,
            microsoft: None,
            overall_success: true,
            skipped: false,
            timestamp: Utc::now(),
        };
        for (provider, report) in reports {
            result.overall_success &= report.success;
            match provider {
                ProviderKind::Google => result.google = Some(report),
                ProviderKind::Microsoft => result.microsoft = Some(report),
            }
        }
        result
    }

    pub fn report(&self, provider: ProviderKind) -> Option<&ProviderSyncReport> {
        match provider {
            ProviderKind::Google => self.google.as_ref(),
            ProviderKind::Microsoft => self.microsoft.as_ref(),
        }
    }

    pub fn total_created(&self) -> u32 {
        self.reports().map(|r| r.to_local.created() + r.to_remote.created()).sum()
    }

    pub fn total_updated(&self) -> u32 {
        self.reports().map(|r| r.to_local.updated() + r.to_remote.updated()).sum()
    }

    fn reports(&self) -> impl Iterator<Item = &ProviderSyncReport> {
        self.google.iter().chain(self.microsoft.iter())
    }
}

/// Per-call options for `sync_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// `None` means "sync if an active connection exists".
    pub sync_google: Option<bool>,
    pub sync_microsoft: Option<bool>,
    pub parallel: bool,
}

impl SyncConfig {
    /// Concurrent run over every connected provider.
    pub fn parallel() -> Self {
        Self { parallel: true, ..Self::default() }
    }

    /// One provider after another, used by scheduled runs.
    pub fn sequential() -> Self {
        Self::default()
    }

    pub fn override_for(&self, provider: ProviderKind) -> Option<bool> {
        match provider {
            ProviderKind::Google => self.sync_google,
            ProviderKind::Microsoft => self.sync_microsoft,
        }
    }
}
