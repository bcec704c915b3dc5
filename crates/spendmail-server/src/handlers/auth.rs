//! Authentication-related handlers

use axum::extract::Request;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::{get_user_email, AppError, AppState, API_KEY_USER, LOCAL_DEV_USER};

/// Response for the /api/me endpoint
#[derive(Serialize)]
pub struct MeResponse {
    /// The authenticated user's email or identifier
    pub user: String,
    pub user_id: i64,
    pub is_admin: bool,
    /// How the user was authenticated
    pub auth_method: String,
}

/// Get the currently authenticated user
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<MeResponse>, AppError> {
    let header_user = get_user_email(request.headers());
    let user = state.current_user(request.headers())?;

    let auth_method = match header_user.as_str() {
        API_KEY_USER => "api_key",
        LOCAL_DEV_USER => "none",
        _ => "cloudflare_header",
    };

    Ok(Json(MeResponse {
        is_admin: state.is_admin(&user),
        user: user.email,
        user_id: user.id,
        auth_method: auth_method.to_string(),
    }))
}
