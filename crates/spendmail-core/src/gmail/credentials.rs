//! SQLite-backed credential store with serialized token refresh
//!
//! Two syncs for the same user can both find an expired access token. Refresh
//! is serialized per user with an async mutex, and the token is re-read after
//! the lock is taken so the second caller reuses the first caller's refresh.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::CredentialStore;
use crate::config::OAuthClientConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{ConnectionStatus, GmailToken};

const REFRESH_TIMEOUT: Duration = Duration::from_secs(15);
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// Response from the OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Credential store over the `gmail_tokens` table
pub struct DbCredentialStore {
    db: Database,
    http_client: Client,
    oauth: Option<OAuthClientConfig>,
    refresh_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl DbCredentialStore {
    /// Without an OAuth client, expired tokens cannot be refreshed
    pub fn new(db: Database, oauth: Option<OAuthClientConfig>) -> Result<Self> {
        let http_client = Client::builder().timeout(REFRESH_TIMEOUT).build()?;
        Ok(Self {
            db,
            http_client,
            oauth,
            refresh_locks: Mutex::new(HashMap::new()),
        })
    }

    fn refresh_lock(&self, user_id: i64) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .refresh_locks
            .lock()
            .map_err(|_| Error::InvalidData("Refresh lock table poisoned".to_string()))?;
        Ok(locks.entry(user_id).or_default().clone())
    }

    /// Drop the refresh lock of a user whose credential is gone
    ///
    /// A refresh already holding the lock keeps its own handle.
    fn forget_refresh_lock(&self, user_id: i64) {
        if let Ok(mut locks) = self.refresh_locks.lock() {
            locks.remove(&user_id);
        }
    }

    fn active_token(&self, user_id: i64) -> Result<GmailToken> {
        match self.db.get_gmail_token(user_id)? {
            Some(token) if token.is_active => Ok(token),
            _ => Err(Error::NotConnected(user_id)),
        }
    }

    async fn refresh(&self, token: &GmailToken) -> Result<String> {
        let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
            Error::InvalidCredentials("No refresh token stored; reconnect Gmail".to_string())
        })?;
        let oauth = self.oauth.as_ref().ok_or_else(|| {
            Error::Config(
                "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET are required to refresh Gmail tokens"
                    .to_string(),
            )
        })?;

        let response = self
            .http_client
            .post(&oauth.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", oauth.client_id.as_str()),
                ("client_secret", oauth.client_secret.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(if message.contains("invalid_grant") {
                Error::InvalidCredentials(message)
            } else {
                Error::Provider {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        let refreshed: TokenResponse = response.json().await?;
        let expires_at = Utc::now() + chrono::Duration::seconds(refreshed.expires_in);
        self.db
            .update_access_token(token.user_id, &refreshed.access_token, expires_at)?;

        info!(user_id = token.user_id, "Refreshed Gmail access token");
        Ok(refreshed.access_token)
    }
}

#[async_trait]
impl CredentialStore for DbCredentialStore {
    async fn get_valid_access_token(&self, user_id: i64) -> Result<String> {
        let token = self.active_token(user_id)?;
        if !token.is_expired(Utc::now()) {
            return Ok(token.access_token);
        }

        let lock = self.refresh_lock(user_id)?;
        let _guard = lock.lock().await;

        // Another task may have refreshed while we waited
        let token = self.active_token(user_id)?;
        if !token.is_expired(Utc::now()) {
            return Ok(token.access_token);
        }

        self.refresh(&token).await
    }

    async fn deactivate(&self, user_id: i64) -> Result<()> {
        if self.db.deactivate_gmail_token(user_id)? {
            info!(user_id, "Deactivated Gmail credential");
        }
        self.forget_refresh_lock(user_id);
        Ok(())
    }

    async fn connection_status(&self, user_id: i64) -> Result<ConnectionStatus> {
        let token = self.db.get_gmail_token(user_id)?;
        Ok(ConnectionStatus {
            connected: token.as_ref().is_some_and(|t| t.is_active),
            last_fetch_at: token.and_then(|t| t.last_fetch_at),
        })
    }

    async fn revoke(&self, user_id: i64) -> Result<()> {
        if let (Some(token), Some(_)) = (self.db.get_gmail_token(user_id)?, &self.oauth) {
            let revoked = self
                .http_client
                .post(REVOKE_URL)
                .form(&[("token", token.refresh_token.unwrap_or(token.access_token))])
                .send()
                .await;
            if let Err(e) = revoked {
                warn!(user_id, error = %e, "Remote token revocation failed");
            }
        }

        self.db.delete_gmail_token(user_id)?;
        self.forget_refresh_lock(user_id);
        info!(user_id, "Revoked Gmail credential");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockGmailServer;

    fn setup(expires_in_secs: i64) -> (Database, i64) {
        let db = Database::in_memory().unwrap();
        let user = db.get_or_create_user("alice@example.com").unwrap();
        db.save_gmail_token(
            user.id,
            "old-token",
            Some("refresh-1"),
            Utc::now() + chrono::Duration::seconds(expires_in_secs),
        )
        .unwrap();
        (db, user.id)
    }

    fn oauth(server: &MockGmailServer) -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            token_url: format!("{}/token", server.url()),
        }
    }

    #[tokio::test]
    async fn test_fresh_token_returned_as_is() {
        let (db, user_id) = setup(3600);
        let store = DbCredentialStore::new(db, None).unwrap();
        assert_eq!(store.get_valid_access_token(user_id).await.unwrap(), "old-token");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let server = MockGmailServer::start(vec![]).await;
        let (db, user_id) = setup(-60);
        let store = Arc::new(DbCredentialStore::new(db.clone(), Some(oauth(&server))).unwrap());

        let (a, b) = tokio::join!(
            store.get_valid_access_token(user_id),
            store.get_valid_access_token(user_id)
        );
        assert_eq!(a.unwrap(), MockGmailServer::VALID_TOKEN);
        assert_eq!(b.unwrap(), MockGmailServer::VALID_TOKEN);
        assert_eq!(server.refresh_count(), 1);

        let stored = db.get_gmail_token(user_id).unwrap().unwrap();
        assert_eq!(stored.access_token, MockGmailServer::VALID_TOKEN);
        assert!(!stored.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn test_dead_refresh_token_is_credential_error() {
        let server = MockGmailServer::start(vec![]).await;
        server.reject_refresh();
        let (db, user_id) = setup(-60);
        let store = DbCredentialStore::new(db, Some(oauth(&server))).unwrap();

        let err = store.get_valid_access_token(user_id).await.unwrap_err();
        assert!(err.is_credential_error());
    }

    #[tokio::test]
    async fn test_expired_without_oauth_client_is_config_error() {
        let (db, user_id) = setup(-60);
        let store = DbCredentialStore::new(db, None).unwrap();
        let err = store.get_valid_access_token(user_id).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_status_deactivate_revoke() {
        let (db, user_id) = setup(3600);
        let store = DbCredentialStore::new(db.clone(), None).unwrap();

        assert!(store.connection_status(user_id).await.unwrap().connected);

        store.deactivate(user_id).await.unwrap();
        assert!(!store.connection_status(user_id).await.unwrap().connected);
        assert!(matches!(
            store.get_valid_access_token(user_id).await,
            Err(Error::NotConnected(_))
        ));
        assert!(db.list_active_gmail_users().unwrap().is_empty());

        store.revoke(user_id).await.unwrap();
        assert!(db.get_gmail_token(user_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_locks_released_with_credential() {
        let server = MockGmailServer::start(vec![]).await;
        let (db, user_id) = setup(-60);
        let store = DbCredentialStore::new(db.clone(), Some(oauth(&server))).unwrap();
        let lock_count = |store: &DbCredentialStore| store.refresh_locks.lock().unwrap().len();

        store.get_valid_access_token(user_id).await.unwrap();
        assert_eq!(lock_count(&store), 1);

        store.deactivate(user_id).await.unwrap();
        assert_eq!(lock_count(&store), 0);

        // No OAuth client, so revoke stays local
        let local = DbCredentialStore::new(db, None).unwrap();
        local.refresh_lock(user_id).unwrap();
        assert_eq!(lock_count(&local), 1);
        local.revoke(user_id).await.unwrap();
        assert_eq!(lock_count(&local), 0);
    }
}
