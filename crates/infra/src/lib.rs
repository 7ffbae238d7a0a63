//! # TimeFlow Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - SQLite repositories for provider connections and local events
//! - Google Calendar and Microsoft Graph clients
//! - OAuth token endpoint clients
//! - Configuration loading and tracing setup
//! - The composition root that wires a [`SyncContext`]
//!
//! ## Architecture
//! - Implements traits defined in `timeflow-core`
//! - Depends on `timeflow-domain` and `timeflow-core`
//! - Contains all "impure" code (I/O, network, filesystem)

pub mod config;
pub mod context;
pub mod database;
pub mod errors;
pub mod integrations;
pub mod observability;

// Re-export commonly used items
pub use context::{Endpoints, SyncContext};
pub use database::*;
pub use errors::InfraError;
pub use integrations::*;
pub use observability::init_tracing;
