//! Gmail connection, fetch and pending-review handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::read_json_or_default;
use crate::{AppError, AppState, SuccessResponse};
use spendmail_core::confirm_transactions;
use spendmail_core::models::{
    round_amount, ConfirmResult, ConnectionStatus, PendingTransaction, PendingUpdate, SyncOptions,
    SyncStats,
};

/// Upper bound on messages per ad-hoc fetch
const MAX_FETCH_RESULTS: u32 = 500;

/// Upper bound on the fetch window
const MAX_WINDOW_DAYS: u32 = 365;

/// Request body for POST /api/gmail/fetch
#[derive(Debug, Default, Deserialize)]
pub struct FetchRequest {
    #[serde(default, alias = "maxResults")]
    pub max_results: Option<u32>,
    #[serde(default, alias = "windowDays")]
    pub window_days: Option<u32>,
}

/// Request body for POST /api/gmail/connect
#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Request body for POST /api/gmail/confirm
///
/// Ids may be sent as numbers or numeric strings; anything else is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default, alias = "transactionIds")]
    pub transaction_ids: Option<Vec<serde_json::Value>>,
}

impl ConfirmRequest {
    fn parsed_ids(&self) -> Vec<i64> {
        self.transaction_ids
            .iter()
            .flatten()
            .filter_map(|v| match v {
                serde_json::Value::Number(n) => n.as_i64(),
                serde_json::Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub success: bool,
    pub deleted_pending: usize,
}

/// GET /api/gmail/status - Whether the caller's Gmail is connected
pub async fn gmail_status(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<ConnectionStatus>, AppError> {
    let user = state.current_user(request.headers())?;
    Ok(Json(state.credentials.connection_status(user.id).await?))
}

/// POST /api/gmail/connect - Store OAuth tokens obtained by the frontend
pub async fn connect_gmail(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<ConnectionStatus>, AppError> {
    let user = state.current_user(request.headers())?;
    let req: ConnectRequest = read_json_or_default(request.into_body()).await?;

    let access_token = req.access_token.trim();
    if access_token.is_empty() {
        return Err(AppError::bad_request("access_token is required"));
    }
    if req.expires_in <= 0 {
        return Err(AppError::bad_request("expires_in must be positive"));
    }

    let expires_at = Utc::now() + Duration::seconds(req.expires_in);
    state.db.save_gmail_token(
        user.id,
        access_token,
        req.refresh_token.as_deref().filter(|t| !t.trim().is_empty()),
        expires_at,
    )?;

    state
        .db
        .log_audit(&user.email, "connect", Some("gmail"), Some(user.id), None)?;

    Ok(Json(state.credentials.connection_status(user.id).await?))
}

/// POST /api/gmail/fetch - Run one sync for the caller now
///
/// Returns partial-success stats even when individual messages failed; only a
/// failure to reach the mailbox is an error response.
pub async fn fetch_gmail(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<SyncStats>, AppError> {
    let user = state.current_user(request.headers())?;
    let req: FetchRequest = read_json_or_default(request.into_body()).await?;

    if !state.credentials.connection_status(user.id).await?.connected {
        return Err(AppError::bad_request(
            "Gmail is not connected. Connect Gmail and try again.",
        ));
    }

    let defaults = state.gmail.sync_options();
    let options = SyncOptions {
        max_results: req
            .max_results
            .unwrap_or(defaults.max_results)
            .clamp(1, MAX_FETCH_RESULTS),
        window_days: req
            .window_days
            .unwrap_or(defaults.window_days)
            .clamp(1, MAX_WINDOW_DAYS),
    };

    let stats = state
        .orchestrator
        .sync_user(user.id, options)
        .await
        .map_err(AppError::from_sync_error)?;

    state.db.log_audit(
        &user.email,
        "fetch",
        Some("gmail"),
        Some(user.id),
        Some(&format!(
            "fetched={} parsed={} saved={} skipped={} errors={}",
            stats.fetched,
            stats.parsed,
            stats.saved,
            stats.skipped,
            stats.errors.len()
        )),
    )?;

    Ok(Json(stats))
}

/// GET /api/gmail/pending - Unconfirmed transactions, newest first
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<PendingTransaction>>, AppError> {
    let user = state.current_user(request.headers())?;
    Ok(Json(state.db.list_pending(user.id)?))
}

/// PUT /api/gmail/pending/:id - Edit an unconfirmed transaction
pub async fn update_pending(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<PendingTransaction>, AppError> {
    let user = state.current_user(request.headers())?;
    let update: PendingUpdate = read_json_or_default(request.into_body()).await?;

    if update.is_empty() {
        return Err(AppError::bad_request("No fields to update"));
    }
    if update.amount.is_some_and(|a| round_amount(a).is_none()) {
        return Err(AppError::bad_request("Amount must be a positive number"));
    }
    if update.vendor.as_deref().is_some_and(|v| v.trim().is_empty()) {
        return Err(AppError::bad_request("Vendor cannot be empty"));
    }

    let updated = state
        .db
        .update_pending(user.id, id, &update)?
        .ok_or_else(|| AppError::not_found("Pending transaction not found"))?;

    state
        .db
        .log_audit(&user.email, "update", Some("pending_transaction"), Some(id), None)?;

    Ok(Json(updated))
}

/// DELETE /api/gmail/pending/:id - Discard an unconfirmed transaction
pub async fn delete_pending(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = state.current_user(request.headers())?;

    if !state.db.delete_pending(user.id, id)? {
        return Err(AppError::not_found("Pending transaction not found"));
    }

    state
        .db
        .log_audit(&user.email, "delete", Some("pending_transaction"), Some(id), None)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/gmail/confirm - Confirm pending transactions into the ledger
pub async fn confirm_pending(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<ConfirmResult>, AppError> {
    let user = state.current_user(request.headers())?;
    let req: ConfirmRequest = read_json_or_default(request.into_body()).await?;

    if req.transaction_ids.as_ref().map_or(true, |ids| ids.is_empty()) {
        return Err(AppError::bad_request("transaction_ids is required"));
    }

    let ids = req.parsed_ids();
    let result = confirm_transactions(&state.db, user.id, &ids)?;
    if result.confirmed == 0 {
        return Err(AppError::not_found("No matching pending transactions"));
    }

    state.db.log_audit(
        &user.email,
        "confirm",
        Some("pending_transaction"),
        None,
        Some(&format!(
            "confirmed={} expenses_created={}",
            result.confirmed, result.expenses_created
        )),
    )?;

    Ok(Json(result))
}

/// POST /api/gmail/revoke - Disconnect Gmail and drop unreviewed rows
pub async fn revoke_gmail(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<RevokeResponse>, AppError> {
    let user = state.current_user(request.headers())?;

    state.credentials.revoke(user.id).await?;
    let deleted_pending = state.db.delete_unconfirmed_pending(user.id)?;

    info!(user_id = user.id, deleted_pending, "Gmail access revoked");
    state.db.log_audit(
        &user.email,
        "revoke",
        Some("gmail"),
        Some(user.id),
        Some(&format!("deleted_pending={}", deleted_pending)),
    )?;

    Ok(Json(RevokeResponse {
        success: true,
        deleted_pending,
    }))
}
