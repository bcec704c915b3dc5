//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `find_user` - Resolve a user by email
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use spendmail_core::db::Database;
use spendmail_core::models::User;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Look up an existing user by email
pub fn find_user(db: &Database, email: &str) -> Result<User> {
    let wanted = email.trim().to_lowercase();
    db.list_users()?
        .into_iter()
        .find(|u| u.email == wanted)
        .with_context(|| format!("No user with email '{}'", email))
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Store Gmail tokens: spendmail connect --user you@example.com --access-token ...");
    println!("  2. Fetch transactions: spendmail sync --user you@example.com");
    println!("  3. Start web UI: spendmail serve");

    Ok(())
}
