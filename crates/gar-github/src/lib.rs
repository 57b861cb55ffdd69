//! GitHub integration for gar.
//!
//! - [`GitHubClient`]: authenticated REST calls with retry, pagination and a
//!   per-run response cache
//! - [`GitHubFetcher`]: the [`gar_core::ActivitySource`] backed by the client
//! - [`oauth`]: device-flow login
//! - [`inbox`]: notification and watch sources for the inbox

pub mod client;
pub mod error;
pub mod fetcher;
pub mod inbox;
pub mod model;
pub mod oauth;

#[cfg(test)]
mod test_server;

pub use client::{ClientConfig, DEFAULT_API_URL, GitHubClient, RetryPolicy, SearchResults};
pub use error::GitHubError;
pub use fetcher::GitHubFetcher;
pub use inbox::{InboxItem, merge as merge_inbox};
pub use oauth::{DEFAULT_CLIENT_ID, DeviceCode, DeviceFlow, OAuthError};
