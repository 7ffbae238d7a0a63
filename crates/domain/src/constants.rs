//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! application.

// Token handling
/// Access tokens expiring within this many seconds are refreshed first.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 5 * 60;

// Sync window and scheduling
/// Months before and after "now" covered by each fetch.
pub const SYNC_WINDOW_MONTHS: u32 = 3;
pub const DEFAULT_AUTO_SYNC_INTERVAL_MINUTES: u64 = 5;
pub const DEFAULT_DEBOUNCE_MS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// Imported event defaults
pub const UNTITLED_EVENT_TITLE: &str = "Untitled Event";
pub const IMPORTED_EVENT_CATEGORY: &str = "other";

// Remote calendar identifiers
pub const GOOGLE_PRIMARY_CALENDAR_ID: &str = "primary";
