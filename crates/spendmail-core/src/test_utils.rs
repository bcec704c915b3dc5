//! Test utilities for spendmail-core
//!
//! This module provides a mock Gmail API server that speaks just enough of
//! `users.messages.list`, `users.messages.get` and the OAuth token endpoint
//! for the real [`crate::gmail::GmailClient`] to be exercised end to end.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Form, Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tokio::sync::oneshot;

use crate::models::RawEmailMessage;

#[derive(Default)]
struct MockState {
    messages: Vec<RawEmailMessage>,
    last_query: Mutex<Option<String>>,
    refresh_count: AtomicUsize,
    reject_refresh: AtomicBool,
}

/// Mock Gmail API server for testing and development
pub struct MockGmailServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockGmailServer {
    /// The only bearer token the mock accepts; also what `/token` hands out
    pub const VALID_TOKEN: &'static str = "mock-access-token";

    /// Start the mock server on an available port, serving the given mailbox
    pub async fn start(messages: Vec<RawEmailMessage>) -> Self {
        let state = Arc::new(MockState {
            messages,
            ..Default::default()
        });

        let app = Router::new()
            .route("/gmail/v1/users/me/messages", get(handle_list))
            .route("/gmail/v1/users/me/messages/:id", get(handle_get))
            .route("/token", post(handle_token))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The `q` parameter of the most recent list call
    pub fn last_query(&self) -> Option<String> {
        self.state.last_query.lock().unwrap().clone()
    }

    /// Number of refresh-token grants served
    pub fn refresh_count(&self) -> usize {
        self.state.refresh_count.load(Ordering::SeqCst)
    }

    /// Answer every later refresh with `invalid_grant`
    pub fn reject_refresh(&self) {
        self.state.reject_refresh.store(true, Ordering::SeqCst);
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockGmailServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        == Some(MockGmailServer::VALID_TOKEN)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": {
                "code": 401,
                "message": "Request had invalid authentication credentials.",
                "status": "UNAUTHENTICATED"
            }
        })),
    )
        .into_response()
}

/// `users.messages.list`
async fn handle_list(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }

    *state.last_query.lock().unwrap() = params.get("q").cloned();
    let max_results = params
        .get("maxResults")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(100);

    let refs: Vec<_> = state
        .messages
        .iter()
        .take(max_results)
        .map(|m| json!({ "id": m.id, "threadId": m.thread_id }))
        .collect();

    Json(json!({
        "resultSizeEstimate": refs.len(),
        "messages": refs,
    }))
    .into_response()
}

/// `users.messages.get`
async fn handle_get(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }

    match state.messages.iter().find(|m| m.id == id) {
        Some(message) => Json(message.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "code": 404, "message": "Requested entity was not found." } })),
        )
            .into_response(),
    }
}

/// OAuth token endpoint, refresh-token grant only
async fn handle_token(
    State(state): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if state.reject_refresh.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })),
        )
            .into_response();
    }

    if form.get("grant_type").map(String::as_str) != Some("refresh_token") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "unsupported_grant_type" })),
        )
            .into_response();
    }

    state.refresh_count.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "access_token": MockGmailServer::VALID_TOKEN,
        "expires_in": 3599,
        "token_type": "Bearer"
    }))
    .into_response()
}
