//! Ledger handlers

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState, MAX_PAGE_LIMIT};
use spendmail_core::models::Expense;

#[derive(Debug, Deserialize)]
pub struct ExpenseQuery {
    #[serde(default = "default_expense_limit")]
    pub limit: i64,
}

fn default_expense_limit() -> i64 {
    100
}

/// GET /api/expenses - The caller's ledger, newest first
pub async fn list_expenses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExpenseQuery>,
    request: Request,
) -> Result<Json<Vec<Expense>>, AppError> {
    let user = state.current_user(request.headers())?;
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    Ok(Json(state.db.list_expenses(user.id, limit)?))
}
