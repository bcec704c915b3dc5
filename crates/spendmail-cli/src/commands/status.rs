//! Status and user management command implementations

use std::path::Path;

use anyhow::Result;
use spendmail_core::db::Database;
use spendmail_core::GmailConfig;

use super::{find_user, open_db};

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    use spendmail_core::db::DB_KEY_ENV;
    use std::fs;

    println!();
    println!("📊 spendmail Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    let gmail = GmailConfig::from_env();
    println!();
    println!(
        "   Scheduled fetch: {} ({})",
        if gmail.cron_enabled { "enabled" } else { "disabled" },
        gmail.cron_schedule
    );
    println!(
        "   Window: {} days, up to {} messages, {} users per batch",
        gmail.window_days, gmail.max_results, gmail.concurrency
    );
    println!(
        "   Mode: {}",
        if gmail.auto_confirm {
            "auto-confirm debits into expenses"
        } else {
            "stage for review"
        }
    );
    println!(
        "   Token refresh: {}",
        if gmail.oauth.is_some() {
            "configured"
        } else {
            "not configured (set GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET)"
        }
    );

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                if let (Ok(users), Ok(active)) = (db.list_users(), db.list_active_gmail_users()) {
                    println!();
                    println!("   Users: {}", users.len());
                    println!("   Gmail connected: {}", active.len());
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_users_list(db: &Database) -> Result<()> {
    let users = db.list_users()?;
    if users.is_empty() {
        println!("No users yet. Connect one with:");
        println!("  spendmail connect --user you@example.com --access-token ...");
        return Ok(());
    }

    let active = db.list_active_gmail_users()?;

    println!();
    println!("👤 Users");
    println!("   ─────────────────────────────────────────────────────────────");

    for user in users {
        let gmail = if active.contains(&user.id) {
            "connected"
        } else {
            "-"
        };
        let last_sync = user
            .last_auto_sync_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());

        println!(
            "   {:>4} │ {:<32} │ {:<9} │ last sync {}{}",
            user.id,
            user.email,
            gmail,
            last_sync,
            if user.is_admin { " │ admin" } else { "" }
        );
        if let Some(error) = user.last_sync_error {
            println!("        └─ ⚠️  {}", error);
        }
    }

    Ok(())
}

pub fn cmd_users_admin(db: &Database, email: &str, grant: bool) -> Result<()> {
    let user = find_user(db, email)?;
    db.set_admin(user.id, grant)?;
    db.log_audit(
        "cli",
        if grant { "grant_admin" } else { "revoke_admin" },
        Some("user"),
        Some(user.id),
        None,
    )?;

    if grant {
        println!("✅ {} is now an admin", user.email);
    } else {
        println!("✅ {} is no longer an admin", user.email);
    }
    Ok(())
}
