//! Gmail collaborators
//!
//! The ingestion pipeline only talks to the mailbox through [`MailFetcher`]
//! and to stored OAuth credentials through [`CredentialStore`]. Production
//! uses [`GmailClient`] over [`DbCredentialStore`]; tests use the mock fetcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ConnectionStatus, RawEmailMessage};

pub mod client;
pub mod credentials;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use client::GmailClient;
pub use credentials::DbCredentialStore;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockMailFetcher;

/// What to ask the mailbox for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchQuery {
    pub max_results: u32,
    pub window_days: u32,
    /// Gmail search expression, `newer_than:` window included
    pub query: String,
}

/// Fetches raw messages from a user's mailbox
///
/// Implementations must surface invalid, expired or revoked credentials as an
/// error for which [`crate::Error::is_credential_error`] is true.
#[async_trait]
pub trait MailFetcher: Send + Sync {
    async fn fetch_messages(&self, user_id: i64, query: &FetchQuery)
        -> Result<Vec<RawEmailMessage>>;
}

/// Access to a user's stored Gmail credential
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// A usable access token, refreshed first if it has expired
    async fn get_valid_access_token(&self, user_id: i64) -> Result<String>;

    /// Stop using the credential until the user reconnects
    async fn deactivate(&self, user_id: i64) -> Result<()>;

    async fn connection_status(&self, user_id: i64) -> Result<ConnectionStatus>;

    /// Revoke and forget the credential
    async fn revoke(&self, user_id: i64) -> Result<()>;
}
