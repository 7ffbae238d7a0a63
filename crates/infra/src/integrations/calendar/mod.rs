//! Calendar provider integrations
//!
//! reqwest clients for:
//! - Google Calendar (API v3)
//! - Microsoft Calendar (Graph, Outlook/365)
//! - Each provider's OAuth 2.0 token endpoint
//!
//! Every call goes through [`transport::Transport`], which bounds it by the
//! configured request timeout.

pub mod google;
pub mod microsoft;
pub mod oauth;
pub mod transport;

pub use google::GoogleCalendarClient;
pub use microsoft::MicrosoftCalendarClient;
pub use oauth::{HttpOAuthClient, OAuthSettings};
pub use transport::{Transport, TransportError};
