//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod admin;
pub mod audit;
pub mod auth;
pub mod expenses;
pub mod gmail;
pub mod notifications;

// Re-export all handlers for use in router
pub use admin::*;
pub use audit::*;
pub use auth::*;
pub use expenses::*;
pub use gmail::*;
pub use notifications::*;

use axum::body::Body;
use serde::de::DeserializeOwned;

use crate::AppError;

/// Maximum accepted JSON request body
const MAX_JSON_BODY: usize = 64 * 1024;

/// Read a JSON request body; an empty body yields `T::default()`
pub(crate) async fn read_json_or_default<T>(body: Body) -> Result<T, AppError>
where
    T: DeserializeOwned + Default,
{
    let bytes = axum::body::to_bytes(body, MAX_JSON_BODY)
        .await
        .map_err(|_| AppError::bad_request("Invalid request body"))?;
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    serde_json::from_slice(&bytes).map_err(|_| AppError::bad_request("Invalid JSON"))
}
