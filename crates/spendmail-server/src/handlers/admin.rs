//! Admin-only handlers: diagnostics and the merchant dictionary

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::read_json_or_default;
use crate::{AppError, AppState, JobSummary, SuccessResponse};
use spendmail_core::models::{SyncOptions, SyncStats};

/// Diagnostic fetches always look back this far
const TEST_FETCH_WINDOW_DAYS: u32 = 30;

#[derive(Debug, Default, Deserialize)]
pub struct TestFetchRequest {
    #[serde(default, alias = "userId")]
    pub user_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AddMerchantRequest {
    #[serde(default)]
    pub alias: String,
    #[serde(default, alias = "canonicalName")]
    pub canonical_name: String,
}

#[derive(Debug, Serialize)]
pub struct MerchantAliasResponse {
    pub alias: String,
    pub canonical_name: String,
}

/// POST /api/admin/test-gmail-fetch - Sync any user's mailbox for diagnostics
pub async fn test_gmail_fetch(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<SyncStats>, AppError> {
    let admin = state.current_user(request.headers())?;
    state.require_admin(&admin)?;
    let req: TestFetchRequest = read_json_or_default(request.into_body()).await?;

    let user_id = req
        .user_id
        .ok_or_else(|| AppError::bad_request("user_id is required"))?;
    let target = state
        .db
        .get_user(user_id)?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let options = SyncOptions {
        max_results: state.gmail.max_results,
        window_days: TEST_FETCH_WINDOW_DAYS,
    };
    let stats = state
        .orchestrator
        .sync_user(target.id, options)
        .await
        .map_err(AppError::from_sync_error)?;

    state.db.log_audit(
        &admin.email,
        "test_fetch",
        Some("gmail"),
        Some(target.id),
        Some(&format!("fetched={} saved={}", stats.fetched, stats.saved)),
    )?;

    Ok(Json(stats))
}

/// POST /api/admin/run-gmail-job - Trigger the scheduled fetch job now
///
/// 409 when a run is already in progress.
pub async fn run_gmail_job(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<JobSummary>, AppError> {
    let admin = state.current_user(request.headers())?;
    state.require_admin(&admin)?;

    let summary = state
        .job
        .run()
        .await
        .ok_or_else(|| AppError::conflict("Gmail fetch job is already running"))?;

    state.db.log_audit(
        &admin.email,
        "run_job",
        Some("gmail_fetch_job"),
        None,
        Some(&format!(
            "users={} failed={} deactivated={}",
            summary.users, summary.failed, summary.deactivated
        )),
    )?;

    Ok(Json(summary))
}

/// GET /api/admin/merchants - Runtime merchant aliases
pub async fn list_merchants(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Vec<MerchantAliasResponse>>, AppError> {
    let admin = state.current_user(request.headers())?;
    state.require_admin(&admin)?;

    let aliases = state
        .db
        .list_merchant_aliases()?
        .into_iter()
        .map(|e| MerchantAliasResponse {
            alias: e.alias,
            canonical_name: e.canonical,
        })
        .collect();

    Ok(Json(aliases))
}

/// POST /api/admin/merchants - Teach the normalizer a new merchant
pub async fn add_merchant(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let admin = state.current_user(request.headers())?;
    state.require_admin(&admin)?;
    let req: AddMerchantRequest = read_json_or_default(request.into_body()).await?;

    state
        .orchestrator
        .normalizer()
        .add_merchant(&req.alias, &req.canonical_name)
        .map_err(|e| match e {
            spendmail_core::Error::InvalidData(msg) => AppError::bad_request(&msg),
            other => other.into(),
        })?;

    state.db.log_audit(
        &admin.email,
        "add_merchant",
        Some("merchant_alias"),
        None,
        Some(&format!("{} -> {}", req.alias.trim(), req.canonical_name.trim())),
    )?;

    Ok(Json(SuccessResponse { success: true }))
}
