//! In-process mail fetcher for tests and offline development
//!
//! Returns canned messages per user and can be told to fail for a user the
//! way the Gmail API does when a credential is dead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::{FetchQuery, MailFetcher};
use crate::error::{Error, Result};
use crate::models::{Header, MessageBody, MessagePart, RawEmailMessage};

/// Receipt time used by the sample builders (2024-05-12T08:00:00Z)
pub const SAMPLE_INTERNAL_DATE: &str = "1715500800000";

/// Mock mail fetcher
///
/// Configured per user with messages or an HTTP-style failure status.
#[derive(Default)]
pub struct MockMailFetcher {
    messages: Mutex<HashMap<i64, Vec<RawEmailMessage>>>,
    failures: Mutex<HashMap<i64, (u16, String)>>,
    queries: Mutex<Vec<(i64, FetchQuery)>>,
    calls: AtomicUsize,
}

impl MockMailFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the mailbox of a user
    pub fn set_messages(&self, user_id: i64, messages: Vec<RawEmailMessage>) {
        if let Ok(mut map) = self.messages.lock() {
            map.insert(user_id, messages);
        }
    }

    /// Make every fetch for this user fail with the given provider status
    pub fn fail_with_status(&self, user_id: i64, status: u16, message: &str) {
        if let Ok(mut map) = self.failures.lock() {
            map.insert(user_id, (status, message.to_string()));
        }
    }

    /// Number of fetch calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent query seen for a user
    pub fn last_query(&self, user_id: i64) -> Option<FetchQuery> {
        self.queries.lock().ok().and_then(|q| {
            q.iter()
                .rev()
                .find(|(id, _)| *id == user_id)
                .map(|(_, query)| query.clone())
        })
    }
}

#[async_trait]
impl MailFetcher for MockMailFetcher {
    async fn fetch_messages(
        &self,
        user_id: i64,
        query: &FetchQuery,
    ) -> Result<Vec<RawEmailMessage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut queries) = self.queries.lock() {
            queries.push((user_id, query.clone()));
        }

        let failure = self
            .failures
            .lock()
            .ok()
            .and_then(|f| f.get(&user_id).cloned());
        if let Some((status, message)) = failure {
            return Err(Error::Provider { status, message });
        }

        let messages = self
            .messages
            .lock()
            .map_err(|_| Error::InvalidData("Mock mailbox lock poisoned".to_string()))?
            .get(&user_id)
            .cloned()
            .unwrap_or_default();

        Ok(messages
            .into_iter()
            .take(query.max_results as usize)
            .collect())
    }
}

fn headers(subject: &str, from: &str) -> Vec<Header> {
    vec![
        Header {
            name: "Subject".to_string(),
            value: subject.to_string(),
        },
        Header {
            name: "From".to_string(),
            value: from.to_string(),
        },
    ]
}

fn leaf(mime_type: &str, text: &str) -> MessagePart {
    MessagePart {
        mime_type: mime_type.to_string(),
        headers: vec![],
        body: MessageBody {
            size: text.len() as u64,
            data: Some(URL_SAFE_NO_PAD.encode(text.as_bytes())),
        },
        parts: vec![],
    }
}

/// A single-part `text/plain` message shaped like a Gmail `format=full` resource
pub fn sample_message(id: &str, subject: &str, from: &str, body: &str) -> RawEmailMessage {
    let mut payload = leaf("text/plain", body);
    payload.headers = headers(subject, from);
    RawEmailMessage {
        id: id.to_string(),
        thread_id: Some(format!("t-{}", id)),
        snippet: None,
        internal_date: Some(SAMPLE_INTERNAL_DATE.to_string()),
        payload,
    }
}

/// A `multipart/alternative` message whose only text is HTML
pub fn sample_html_message(id: &str, subject: &str, from: &str, html: &str) -> RawEmailMessage {
    RawEmailMessage {
        id: id.to_string(),
        thread_id: Some(format!("t-{}", id)),
        snippet: None,
        internal_date: Some(SAMPLE_INTERNAL_DATE.to_string()),
        payload: MessagePart {
            mime_type: "multipart/alternative".to_string(),
            headers: headers(subject, from),
            body: MessageBody::default(),
            parts: vec![leaf("text/html", html)],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::plain_text;

    fn query(max_results: u32) -> FetchQuery {
        FetchQuery {
            max_results,
            window_days: 30,
            query: "newer_than:30d".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_returns_user_mailbox() {
        let fetcher = MockMailFetcher::new();
        fetcher.set_messages(
            1,
            vec![
                sample_message("a", "s", "f", "one"),
                sample_message("b", "s", "f", "two"),
            ],
        );

        assert_eq!(fetcher.fetch_messages(1, &query(10)).await.unwrap().len(), 2);
        assert_eq!(fetcher.fetch_messages(1, &query(1)).await.unwrap().len(), 1);
        assert!(fetcher.fetch_messages(2, &query(10)).await.unwrap().is_empty());
        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(fetcher.last_query(1).unwrap().max_results, 1);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let fetcher = MockMailFetcher::new();
        fetcher.fail_with_status(1, 401, "Invalid Credentials");
        let err = fetcher.fetch_messages(1, &query(10)).await.unwrap_err();
        assert!(err.is_credential_error());
    }

    #[test]
    fn test_sample_builders_decode() {
        let msg = sample_message("a", "Debit", "bank@x.com", "Rs.10 debited");
        assert_eq!(plain_text(&msg).unwrap(), "Rs.10 debited");

        let msg = sample_html_message("b", "Debit", "bank@x.com", "<p>Rs.10&nbsp;debited</p>");
        assert_eq!(plain_text(&msg).unwrap(), "Rs.10 debited");
        assert_eq!(msg.subject(), "Debit");
    }
}
