//! # TimeFlow Domain
//!
//! Business domain types and models for TimeFlow calendar sync.
//!
//! This crate contains:
//! - Calendar provider connections and local events
//! - Remote event representation shared by every provider client
//! - Sync result records and the sync error taxonomy
//! - Configuration structures and domain constants
//!
//! ## Architecture
//! - No dependencies on other TimeFlow crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
