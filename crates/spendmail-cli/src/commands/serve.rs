//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};
use spendmail_core::GmailConfig;

use super::open_db;

/// Split a comma-separated environment variable into trimmed, non-empty values
pub fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
    static_dir: Option<&Path>,
) -> Result<()> {
    println!("🚀 Starting spendmail web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    if let Some(dir) = static_dir {
        println!("   Static files: {}", dir.display());
    }

    let api_keys = env_list("SPENDMAIL_API_KEYS");
    let admin_emails = env_list("SPENDMAIL_ADMIN_EMAILS");

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else {
        println!("   🔒 Authentication: Cloudflare Access (header)");
        if !api_keys.is_empty() {
            println!(
                "   🔑 API keys: {} configured (SPENDMAIL_API_KEYS)",
                api_keys.len()
            );
        }
    }
    if !admin_emails.is_empty() {
        println!("   👤 Admins: {}", admin_emails.join(", "));
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }

    let gmail = GmailConfig::from_env();
    if gmail.cron_enabled {
        println!(
            "   ⏰ Gmail fetch: '{}' ({} users at a time)",
            gmail.cron_schedule, gmail.concurrency
        );
    } else {
        println!("   ⏰ Gmail fetch: disabled (ENABLE_GMAIL_CRON=false)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    let config = spendmail_server::ServerConfig {
        require_auth: !no_auth,
        allowed_origins: vec![],
        api_keys,
        admin_emails,
    };

    let static_dir_str = static_dir
        .map(|p| p.to_str().context("static_dir path must be valid UTF-8"))
        .transpose()?;
    spendmail_server::serve_with_config(db, host, port, static_dir_str, config).await?;

    Ok(())
}
