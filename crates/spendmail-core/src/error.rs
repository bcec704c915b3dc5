//! Error types for spendmail

use thiserror::Error;

/// Substrings that identify an expired, revoked or otherwise unusable
/// Gmail credential in provider error messages.
const CREDENTIAL_ERROR_MARKERS: &[&str] = &[
    "invalid_grant",
    "token has been expired or revoked",
    "invalid credentials",
    "invalid_token",
    "unauthorized",
];

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Gmail credentials are invalid or expired: {0}")]
    InvalidCredentials(String),

    #[error("Gmail is not connected for user {0}")]
    NotConnected(i64),

    #[error("Mail provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error means the user's Gmail credential can no longer be used
    ///
    /// Covers explicit credential errors, HTTP 400/401 from the provider, and
    /// the well-known OAuth error strings Google returns on a dead refresh token.
    pub fn is_credential_error(&self) -> bool {
        match self {
            Self::InvalidCredentials(_) => true,
            Self::Provider { status, .. } if *status == 400 || *status == 401 => true,
            other => {
                let message = other.to_string().to_lowercase();
                CREDENTIAL_ERROR_MARKERS
                    .iter()
                    .any(|marker| message.contains(marker))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
