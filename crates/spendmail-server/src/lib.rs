//! spendmail Web Server
//!
//! Axum-based REST API for reviewing and confirming transactions staged from
//! Gmail bank alerts, plus the scheduled Gmail fetch job.
//!
//! Security features:
//! - Cloudflare Access or API key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Audit logging for every state-changing call
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use spendmail_core::db::Database;
use spendmail_core::models::User;
use spendmail_core::{
    CredentialStore, DbCredentialStore, GmailClient, GmailConfig, MailFetcher, NotificationSink,
    SyncOrchestrator,
};

mod handlers;
mod scheduler;

pub use scheduler::{parse_schedule, start_gmail_scheduler, GmailFetchJob, JobSummary};

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Cloudflare Access header for authenticated user email
const CF_ACCESS_USER_HEADER: &str = "cf-access-authenticated-user-email";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Identity used for API key requests
pub const API_KEY_USER: &str = "api-key";

/// Identity used when authentication is disabled
pub const LOCAL_DEV_USER: &str = "local-dev";

#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only in production)
    pub allowed_origins: Vec<String>,
    /// API keys for internal service authentication (alternative to Cloudflare Access)
    /// Format: "Bearer <key>" in Authorization header
    pub api_keys: Vec<String>,
    /// Emails that may call the admin endpoints in addition to users flagged as admin
    pub admin_emails: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
            admin_emails: vec![],
        }
    }
}

/// The Gmail collaborators the API and the scheduled job share
#[derive(Clone)]
pub struct GmailServices {
    pub config: GmailConfig,
    pub fetcher: Arc<dyn MailFetcher>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl GmailServices {
    /// Real Gmail REST client over database-backed credentials
    pub fn from_config(db: &Database, config: GmailConfig) -> anyhow::Result<Self> {
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(DbCredentialStore::new(db.clone(), config.oauth.clone())?);
        let fetcher: Arc<dyn MailFetcher> =
            Arc::new(GmailClient::new(&config.api_base, credentials.clone())?);
        Ok(Self {
            config,
            fetcher,
            credentials,
        })
    }

    /// Same as [`GmailServices::from_config`] with [`GmailConfig::from_env`]
    pub fn from_env(db: &Database) -> anyhow::Result<Self> {
        Self::from_config(db, GmailConfig::from_env())
    }
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub gmail: GmailConfig,
    pub credentials: Arc<dyn CredentialStore>,
    pub orchestrator: SyncOrchestrator,
    /// The scheduled fetch job (also reachable from the admin API)
    pub job: Arc<GmailFetchJob>,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig, services: GmailServices) -> Self {
        let orchestrator =
            SyncOrchestrator::from_config(db.clone(), services.fetcher.clone(), &services.config);
        let notifier: Arc<dyn NotificationSink> = Arc::new(db.clone());
        let job = Arc::new(GmailFetchJob::new(
            db.clone(),
            orchestrator.clone(),
            services.credentials.clone(),
            notifier,
            services.config.concurrency,
            services.config.sync_options(),
        ));

        Self {
            db,
            config,
            gmail: services.config,
            credentials: services.credentials,
            orchestrator,
            job,
        }
    }

    /// Resolve (creating on first sight) the user behind a request
    pub fn current_user(&self, headers: &axum::http::HeaderMap) -> Result<User, AppError> {
        let email = get_user_email(headers);
        Ok(self.db.get_or_create_user(&email)?)
    }

    /// Admins are users flagged in the database or listed in the server config
    pub fn is_admin(&self, user: &User) -> bool {
        user.is_admin
            || self
                .config
                .admin_emails
                .iter()
                .any(|e| e.eq_ignore_ascii_case(&user.email))
    }

    pub fn require_admin(&self, user: &User) -> Result<(), AppError> {
        if self.is_admin(user) {
            Ok(())
        } else {
            warn!(user = %user.email, "Admin endpoint called by non-admin");
            Err(AppError::forbidden("Admin access required"))
        }
    }
}

/// Authentication middleware - validates Cloudflare Access headers or API keys
///
/// # Security Notes
///
/// **Cloudflare Access headers**: The `CF-Access-Authenticated-User-Email` header
/// is safe behind Cloudflare Tunnel (which strips/rewrites CF headers), but can be
/// spoofed if the server is exposed directly to the internet.
///
/// **API keys**: Compared using constant-time comparison to prevent timing attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let cf_user = request
        .headers()
        .get(CF_ACCESS_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());

    if let Some(email) = cf_user {
        info!(user = %email, path = %request.uri().path(), "Authenticated via Cloudflare Access header");
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        info!(user = API_KEY_USER, path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time comparison
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    for key in valid_keys {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        if provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes)) {
            return true;
        }
    }
    false
}

/// Extract user email from request headers
/// Returns CF Access email, "api-key" for API key auth, or "local-dev" for unauthenticated
pub fn get_user_email(headers: &axum::http::HeaderMap) -> String {
    if let Some(email) = headers
        .get(CF_ACCESS_USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
    {
        return email.to_string();
    }

    if headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .is_some()
    {
        return API_KEY_USER.to_string();
    }

    LOCAL_DEV_USER.to_string()
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(
    db: Database,
    static_dir: Option<&str>,
    config: ServerConfig,
    services: GmailServices,
) -> Router {
    let state = Arc::new(AppState::new(db, config, services));
    create_router_with_state(state, static_dir)
}

/// Create the application router over prebuilt state (for testing and the scheduler)
pub fn create_router_with_state(state: Arc<AppState>, static_dir: Option<&str>) -> Router {
    let config = state.config.clone();

    let api_routes = Router::new()
        // Auth
        .route("/me", get(handlers::get_me))
        // Gmail
        .route("/gmail/status", get(handlers::gmail_status))
        .route("/gmail/connect", post(handlers::connect_gmail))
        .route("/gmail/fetch", post(handlers::fetch_gmail))
        .route("/gmail/pending", get(handlers::list_pending))
        .route(
            "/gmail/pending/:id",
            put(handlers::update_pending).delete(handlers::delete_pending),
        )
        .route("/gmail/confirm", post(handlers::confirm_pending))
        .route("/gmail/revoke", post(handlers::revoke_gmail))
        // Ledger
        .route("/expenses", get(handlers::list_expenses))
        // Notifications
        .route("/notifications", get(handlers::list_notifications))
        .route(
            "/notifications/:id/read",
            post(handlers::mark_notification_read),
        )
        // Admin
        .route("/admin/test-gmail-fetch", post(handlers::test_gmail_fetch))
        .route("/admin/run-gmail-job", post(handlers::run_gmail_job))
        .route(
            "/admin/merchants",
            get(handlers::list_merchants).post(handlers::add_merchant),
        )
        .route("/admin/audit", get(handlers::list_audit_log));

    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data:; connect-src 'self'; frame-ancestors 'none'",
    );

    let mut app = Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp_value,
        ));

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app
}

/// Start the server with the default configuration
pub async fn serve(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
) -> anyhow::Result<()> {
    serve_with_config(db, host, port, static_dir, ServerConfig::default()).await
}

/// Start the server and, when enabled, the scheduled Gmail fetch job
pub async fn serve_with_config(
    db: Database,
    host: &str,
    port: u16,
    static_dir: Option<&str>,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }

    let services = GmailServices::from_env(&db)?;
    if services.config.oauth.is_none() {
        info!("ℹ️  Google OAuth client not configured (set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET to refresh tokens)");
    }

    let state = Arc::new(AppState::new(db, config, services));

    if state.gmail.cron_enabled {
        let schedule = parse_schedule(&state.gmail.cron_schedule)?;
        start_gmail_scheduler(state.job.clone(), schedule);
        info!(schedule = %state.gmail.cron_schedule, "Gmail fetch job scheduled");
    } else {
        info!("ℹ️  Scheduled Gmail fetch disabled (ENABLE_GMAIL_CRON=false)");
    }

    let app = create_router_with_state(state, static_dir)
        .into_make_service_with_connect_info::<std::net::SocketAddr>();
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn forbidden(msg: &str) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Map a failed mailbox sync to a response
    ///
    /// Credential problems ask the user to reconnect; anything else is an
    /// internal error.
    pub fn from_sync_error(err: spendmail_core::Error) -> Self {
        match err {
            spendmail_core::Error::NotConnected(_) => {
                Self::bad_request("Gmail is not connected. Connect Gmail and try again.")
            }
            e if e.is_credential_error() => {
                warn!(error = %e, "Gmail credential rejected");
                Self::bad_request(
                    "Gmail access has expired or was revoked. Please reconnect Gmail.",
                )
            }
            e => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            internal: Some(err),
        }
    }
}
