//! Domain types and models

pub mod event;
pub mod provider;
pub mod sync;

pub use event::{
    Event, EventParseFailure, EventPatch, EventTime, NewEvent, RemoteEvent, RemoteEventEntry,
};
pub use provider::{
    AuthorizationCode, CalendarProvider, ProviderConnection, ProviderKind, TokenGrant,
};
pub use sync::{
    ProviderSyncReport, SyncConfig, SyncDirection, SyncManagerResult, SyncMode, SyncResult,
    SyncTally, SyncWindow,
};
