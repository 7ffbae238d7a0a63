//! External service integrations

pub mod calendar;

pub use calendar::{GoogleCalendarClient, HttpOAuthClient, MicrosoftCalendarClient, OAuthSettings};
