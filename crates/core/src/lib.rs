//! # TimeFlow Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for the local store, OAuth token endpoints, and remote
//!   calendar APIs
//! - The token provider that keeps access tokens valid
//! - The per-provider reconciliation adapter
//! - The sync manager that orchestrates adapters, schedules runs, and
//!   notifies listeners
//!
//! ## Architecture Principles
//! - Only depends on `timeflow-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod calendar_ports;
pub mod sync;

pub use calendar_ports::{OAuthTokenClient, RemoteCalendarClient};
pub use sync::ports::{EventRepository, ProviderRepository, ProviderSync, TokenSource};
pub use sync::{
    ProviderSyncAdapter, SyncManager, SyncManagerOptions, SyncSubscription, TokenProvider,
};
