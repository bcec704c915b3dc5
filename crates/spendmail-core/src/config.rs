//! Gmail ingestion configuration
//!
//! Read from environment variables:
//!
//! - `GMAIL_CRON_SCHEDULE`: cron expression for the scheduled fetch (default `0 2 * * *`)
//! - `GMAIL_FETCH_CONCURRENCY`: users synced in parallel per batch (default 5)
//! - `ENABLE_GMAIL_CRON`: run the scheduled fetch at all (default true)
//! - `GMAIL_FETCH_WINDOW_DAYS`: days of mail to look back (default 30)
//! - `GMAIL_FETCH_MAX_RESULTS`: messages per sync (default 50)
//! - `GMAIL_ALLOWED_SENDER_PATTERNS`: comma-separated sender substrings
//! - `GMAIL_AUTO_CONFIRM_TRANSACTIONS`: write debits straight to the ledger (default false)
//! - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`: OAuth client for token refresh
//! - `GMAIL_API_BASE`: Gmail API base URL override
//! - `GOOGLE_TOKEN_URL`: OAuth token endpoint override

use tracing::warn;

use crate::models::SyncOptions;
use crate::staging::StagingMode;

pub const DEFAULT_CRON_SCHEDULE: &str = "0 2 * * *";
pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Bank and payment-app sender fragments searched when none are configured
pub const DEFAULT_SENDER_PATTERNS: &[&str] = &[
    "alerts@hdfcbank.net",
    "icicibank.com",
    "sbi.co.in",
    "axisbank.com",
    "kotak.com",
    "yesbank.in",
    "idfcfirstbank.com",
    "paytm.com",
    "phonepe.com",
    "amazonpay.in",
];

/// OAuth client used to refresh access tokens
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

/// Everything the Gmail pipeline reads from the environment
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub cron_schedule: String,
    pub cron_enabled: bool,
    pub concurrency: usize,
    pub window_days: u32,
    pub max_results: u32,
    pub allowed_senders: Vec<String>,
    pub auto_confirm: bool,
    pub api_base: String,
    pub oauth: Option<OAuthClientConfig>,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            cron_schedule: DEFAULT_CRON_SCHEDULE.to_string(),
            cron_enabled: true,
            concurrency: 5,
            window_days: 30,
            max_results: 50,
            allowed_senders: DEFAULT_SENDER_PATTERNS.iter().map(|s| s.to_string()).collect(),
            auto_confirm: false,
            api_base: DEFAULT_GMAIL_API_BASE.to_string(),
            oauth: None,
        }
    }
}

impl GmailConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse configuration from any key lookup; invalid values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let concurrency = parse_or(
            get("GMAIL_FETCH_CONCURRENCY"),
            "GMAIL_FETCH_CONCURRENCY",
            defaults.concurrency,
        );
        let concurrency = if concurrency == 0 {
            warn!("GMAIL_FETCH_CONCURRENCY is 0, using 1");
            1
        } else {
            concurrency
        };

        let allowed_senders = get("GMAIL_ALLOWED_SENDER_PATTERNS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.allowed_senders);

        let oauth = match (get("GOOGLE_CLIENT_ID"), get("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(OAuthClientConfig {
                client_id,
                client_secret,
                token_url: get("GOOGLE_TOKEN_URL")
                    .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            }),
            _ => None,
        };

        Self {
            cron_schedule: get("GMAIL_CRON_SCHEDULE").unwrap_or(defaults.cron_schedule),
            cron_enabled: parse_bool_or(
                get("ENABLE_GMAIL_CRON"),
                "ENABLE_GMAIL_CRON",
                defaults.cron_enabled,
            ),
            concurrency,
            window_days: parse_or(
                get("GMAIL_FETCH_WINDOW_DAYS"),
                "GMAIL_FETCH_WINDOW_DAYS",
                defaults.window_days,
            ),
            max_results: parse_or(
                get("GMAIL_FETCH_MAX_RESULTS"),
                "GMAIL_FETCH_MAX_RESULTS",
                defaults.max_results,
            ),
            allowed_senders,
            auto_confirm: parse_bool_or(
                get("GMAIL_AUTO_CONFIRM_TRANSACTIONS"),
                "GMAIL_AUTO_CONFIRM_TRANSACTIONS",
                defaults.auto_confirm,
            ),
            api_base: get("GMAIL_API_BASE")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            oauth,
        }
    }

    /// Default options for a user-triggered or scheduled sync
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            max_results: self.max_results,
            window_days: self.window_days,
        }
    }

    /// How staged candidates are written
    pub fn staging_mode(&self) -> StagingMode {
        if self.auto_confirm {
            StagingMode::AutoConfirm
        } else {
            StagingMode::Review
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        None => default,
        Some(v) => v.parse().unwrap_or_else(|_| {
            warn!(key, value = %v, "Invalid value, using default");
            default
        }),
    }
}

fn parse_bool_or(value: Option<String>, key: &str, default: bool) -> bool {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        None => default,
        Some("true" | "1" | "yes" | "on") => true,
        Some("false" | "0" | "no" | "off") => false,
        Some(other) => {
            warn!(key, value = other, "Invalid boolean, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> GmailConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GmailConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.cron_schedule, "0 2 * * *");
        assert!(c.cron_enabled);
        assert_eq!(c.concurrency, 5);
        assert_eq!(c.window_days, 30);
        assert_eq!(c.max_results, 50);
        assert!(!c.auto_confirm);
        assert!(c.oauth.is_none());
        assert_eq!(c.staging_mode(), StagingMode::Review);
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("GMAIL_CRON_SCHEDULE", "*/15 * * * *"),
            ("ENABLE_GMAIL_CRON", "false"),
            ("GMAIL_FETCH_CONCURRENCY", "2"),
            ("GMAIL_FETCH_WINDOW_DAYS", "7"),
            ("GMAIL_ALLOWED_SENDER_PATTERNS", "alerts@bank.com, ,upi@psp.in"),
            ("GMAIL_AUTO_CONFIRM_TRANSACTIONS", "1"),
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GMAIL_API_BASE", "http://localhost:9000/"),
        ]);
        assert_eq!(c.cron_schedule, "*/15 * * * *");
        assert!(!c.cron_enabled);
        assert_eq!(c.concurrency, 2);
        assert_eq!(c.window_days, 7);
        assert_eq!(c.allowed_senders, vec!["alerts@bank.com", "upi@psp.in"]);
        assert_eq!(c.staging_mode(), StagingMode::AutoConfirm);
        assert_eq!(c.api_base, "http://localhost:9000");
        let oauth = c.oauth.unwrap();
        assert_eq!(oauth.token_url, DEFAULT_TOKEN_URL);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let c = config(&[
            ("GMAIL_FETCH_CONCURRENCY", "0"),
            ("GMAIL_FETCH_MAX_RESULTS", "lots"),
            ("ENABLE_GMAIL_CRON", "maybe"),
        ]);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_results, 50);
        assert!(c.cron_enabled);
    }
}
