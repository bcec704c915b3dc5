//! Notification handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    Json,
};
use serde::Deserialize;

use crate::{AppError, AppState, SuccessResponse};
use spendmail_core::models::Notification;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

/// GET /api/notifications - The caller's notifications, newest first
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NotificationQuery>,
    request: Request,
) -> Result<Json<Vec<Notification>>, AppError> {
    let user = state.current_user(request.headers())?;
    Ok(Json(state.db.list_notifications(user.id, params.unread)?))
}

/// POST /api/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    request: Request,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = state.current_user(request.headers())?;
    if !state.db.mark_notification_read(user.id, id)? {
        return Err(AppError::not_found("Notification not found"));
    }
    Ok(Json(SuccessResponse { success: true }))
}
