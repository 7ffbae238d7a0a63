//! Calendar synchronization: token lifecycle, per-provider reconciliation,
//! and orchestration.

pub mod adapter;
pub mod manager;
pub mod ports;
pub mod token_provider;

pub use adapter::ProviderSyncAdapter;
pub use manager::{SyncManager, SyncManagerOptions, SyncSubscription};
pub use token_provider::TokenProvider;
