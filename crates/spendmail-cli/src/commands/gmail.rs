//! Gmail command implementations (connect, sync, pending, confirm, expenses, notifications)

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use spendmail_core::db::Database;
use spendmail_core::models::{Direction, SyncOptions, SyncStats};
use spendmail_core::{confirm_transactions, NotificationSink, SyncOrchestrator};
use spendmail_server::{GmailFetchJob, GmailServices, JobSummary};

use super::{find_user, truncate};

pub fn cmd_connect(
    db: &Database,
    email: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in: i64,
) -> Result<()> {
    if access_token.trim().is_empty() {
        bail!("Access token cannot be empty");
    }
    if expires_in <= 0 {
        bail!("--expires-in must be positive");
    }

    let user = db.get_or_create_user(email)?;
    db.save_gmail_token(
        user.id,
        access_token.trim(),
        refresh_token.map(str::trim).filter(|t| !t.is_empty()),
        Utc::now() + Duration::seconds(expires_in),
    )
    .context("Failed to store Gmail token")?;
    db.log_audit("cli", "connect", Some("gmail"), Some(user.id), None)?;

    println!("✅ Gmail connected for {}", user.email);
    Ok(())
}

/// Sync options from CLI flags, falling back to configuration
pub fn sync_options(
    defaults: SyncOptions,
    max_results: Option<u32>,
    window_days: Option<u32>,
) -> SyncOptions {
    SyncOptions {
        max_results: max_results.unwrap_or(defaults.max_results).max(1),
        window_days: window_days.unwrap_or(defaults.window_days).max(1),
    }
}

pub async fn cmd_sync_user(
    db: &Database,
    services: GmailServices,
    email: &str,
    max_results: Option<u32>,
    window_days: Option<u32>,
) -> Result<()> {
    let user = find_user(db, email)?;
    if !services.credentials.connection_status(user.id).await?.connected {
        bail!(
            "Gmail is not connected for {}. Run: spendmail connect --user {} --access-token ...",
            user.email,
            user.email
        );
    }

    let options = sync_options(services.config.sync_options(), max_results, window_days);
    let orchestrator =
        SyncOrchestrator::from_config(db.clone(), services.fetcher.clone(), &services.config);

    println!(
        "📬 Fetching up to {} messages from the last {} days for {}...",
        options.max_results, options.window_days, user.email
    );

    let stats = match orchestrator.sync_user(user.id, options).await {
        Ok(stats) => stats,
        Err(e) if e.is_credential_error() => {
            bail!("Gmail access has expired or was revoked ({}). Reconnect and try again.", e)
        }
        Err(e) => return Err(e.into()),
    };

    print_sync_stats(&stats);
    if stats.saved > 0 && !services.config.auto_confirm {
        println!();
        println!("Review with: spendmail pending --user {}", user.email);
    }
    Ok(())
}

pub fn print_sync_stats(stats: &SyncStats) {
    println!();
    println!("📊 Sync Results");
    println!("   ─────────────────────────────");
    println!("   Fetched: {}", stats.fetched);
    println!("   Parsed:  {}", stats.parsed);
    println!("   Saved:   {}", stats.saved);
    println!("   Skipped: {}", stats.skipped);
    if !stats.errors.is_empty() {
        println!("   ⚠️  Errors: {}", stats.errors.len());
        for error in &stats.errors {
            println!("      {} │ {}", error.id, truncate(&error.error, 60));
        }
    }
}

pub async fn cmd_sync_all(db: &Database, services: GmailServices) -> Result<()> {
    let orchestrator =
        SyncOrchestrator::from_config(db.clone(), services.fetcher.clone(), &services.config);
    let notifier: Arc<dyn NotificationSink> = Arc::new(db.clone());
    let job = GmailFetchJob::new(
        db.clone(),
        orchestrator,
        services.credentials.clone(),
        notifier,
        services.config.concurrency,
        services.config.sync_options(),
    );

    println!("📬 Running Gmail fetch for every connected user...");
    let summary: JobSummary = job
        .run()
        .await
        .context("Gmail fetch job is already running")?;

    println!();
    println!("📊 Job Results");
    println!("   ─────────────────────────────");
    println!("   Users:       {}", summary.users);
    println!("   Succeeded:   {}", summary.succeeded);
    println!("   Failed:      {}", summary.failed);
    println!("   Deactivated: {}", summary.deactivated);
    println!("   Saved:       {}", summary.saved);
    Ok(())
}

pub fn cmd_pending(db: &Database, email: &str) -> Result<()> {
    let user = find_user(db, email)?;
    let pending = db.list_pending(user.id)?;

    if pending.is_empty() {
        println!("No pending transactions. Fetch some with:");
        println!("  spendmail sync --user {}", user.email);
        return Ok(());
    }

    println!();
    println!("📝 Pending Transactions ({})", pending.len());
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in pending {
        let amount_str = match tx.direction {
            Direction::Debit => format!("\x1b[31m₹{:.2}\x1b[0m", tx.amount),
            Direction::Credit => format!("\x1b[32m+₹{:.2}\x1b[0m", tx.amount),
        };

        println!(
            "   {:>4} │ {} │ {:>12} │ {:<24} │ {}",
            tx.id,
            tx.date.format("%Y-%m-%d"),
            amount_str,
            truncate(&tx.vendor, 24),
            tx.confidence.as_str()
        );
    }

    println!();
    println!("Confirm with: spendmail confirm --user {} <ids>", user.email);
    Ok(())
}

pub fn cmd_confirm(db: &Database, email: &str, ids: &[i64], all: bool) -> Result<()> {
    let user = find_user(db, email)?;
    let ids: Vec<i64> = if all {
        db.list_pending(user.id)?.iter().map(|p| p.id).collect()
    } else {
        ids.to_vec()
    };

    if ids.is_empty() {
        println!("Nothing to confirm.");
        return Ok(());
    }

    let result = confirm_transactions(db, user.id, &ids)?;
    if result.confirmed == 0 {
        bail!("None of the given ids are pending transactions of {}", user.email);
    }

    db.log_audit(
        "cli",
        "confirm",
        Some("pending_transaction"),
        None,
        Some(&format!(
            "user={} confirmed={} expenses_created={}",
            user.email, result.confirmed, result.expenses_created
        )),
    )?;

    println!(
        "✅ Confirmed {} transaction(s), {} expense(s) created",
        result.confirmed, result.expenses_created
    );
    Ok(())
}

pub fn cmd_expenses(db: &Database, email: &str, limit: i64) -> Result<()> {
    let user = find_user(db, email)?;
    let expenses = db.list_expenses(user.id, limit.max(1))?;

    if expenses.is_empty() {
        println!("No expenses yet.");
        return Ok(());
    }

    println!();
    println!("💸 Expenses");
    println!("   ─────────────────────────────────────────────────────────────");

    for expense in expenses {
        println!(
            "   {} │ {:>10.2} │ {:<16} │ {}",
            expense.date.format("%Y-%m-%d"),
            expense.amount,
            truncate(&expense.category, 16),
            truncate(&expense.description, 40)
        );
    }

    Ok(())
}

pub fn cmd_notifications(db: &Database, email: &str, unread_only: bool) -> Result<()> {
    let user = find_user(db, email)?;
    let notifications = db.list_notifications(user.id, unread_only)?;

    if notifications.is_empty() {
        println!("No notifications.");
        return Ok(());
    }

    for n in notifications {
        let marker = if n.is_read { " " } else { "•" };
        println!(
            "{} {} │ {} │ {}",
            marker,
            n.created_at.format("%Y-%m-%d %H:%M"),
            n.title,
            n.message
        );
    }

    Ok(())
}
