//! Gmail REST API client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{CredentialStore, FetchQuery, MailFetcher};
use crate::error::{Error, Result};
use crate::models::RawEmailMessage;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches messages through `users.messages.list` and `users.messages.get`
#[derive(Clone)]
pub struct GmailClient {
    http_client: Client,
    api_base: String,
    credentials: Arc<dyn CredentialStore>,
}

/// Response from `users.messages.list`
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

impl GmailClient {
    /// Create a client against the given API base (e.g. `https://gmail.googleapis.com`)
    pub fn new(api_base: &str, credentials: Arc<dyn CredentialStore>) -> Result<Self> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn list_message_ids(&self, token: &str, query: &FetchQuery) -> Result<Vec<String>> {
        let response = self
            .http_client
            .get(format!("{}/gmail/v1/users/me/messages", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("q", query.query.clone()),
                ("maxResults", query.max_results.to_string()),
            ])
            .send()
            .await?;

        let list: ListResponse = check_status(response).await?.json().await?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, token: &str, id: &str) -> Result<RawEmailMessage> {
        let response = self
            .http_client
            .get(format!("{}/gmail/v1/users/me/messages/{}", self.api_base, id))
            .bearer_auth(token)
            .query(&[("format", "full")])
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }
}

/// Turn a non-2xx response into a provider error carrying the status
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::Provider {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl MailFetcher for GmailClient {
    async fn fetch_messages(
        &self,
        user_id: i64,
        query: &FetchQuery,
    ) -> Result<Vec<RawEmailMessage>> {
        let token = self.credentials.get_valid_access_token(user_id).await?;

        let ids = self.list_message_ids(&token, query).await?;
        debug!(user_id, count = ids.len(), "Listed Gmail messages");

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_message(&token, &id).await {
                Ok(message) => messages.push(message),
                Err(e) if e.is_credential_error() => return Err(e),
                Err(e) => warn!(user_id, message_id = %id, error = %e, "Failed to fetch message"),
            }
        }

        Ok(messages)
    }
}
