//! spendmail CLI - Gmail transaction-alert ingestion
//!
//! Usage:
//!   spendmail init                      Initialize database
//!   spendmail sync --user EMAIL         Fetch and stage transactions from Gmail
//!   spendmail pending --user EMAIL      Review staged transactions
//!   spendmail serve --port 3000         Start web server and scheduled fetch

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            no_auth,
            static_dir,
        } => {
            commands::cmd_serve(
                &cli.db,
                &host,
                port,
                no_auth,
                cli.no_encrypt,
                static_dir.as_deref(),
            )
            .await
        }
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
        Commands::Users { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(UsersAction::List) => commands::cmd_users_list(&db),
                Some(UsersAction::Admin { email, revoke }) => {
                    commands::cmd_users_admin(&db, &email, !revoke)
                }
            }
        }
        Commands::Connect {
            user,
            access_token,
            refresh_token,
            expires_in,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_connect(&db, &user, &access_token, refresh_token.as_deref(), expires_in)
        }
        Commands::Sync {
            user,
            all,
            max_results,
            window_days,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let services = spendmail_server::GmailServices::from_env(&db)?;
            match (user, all) {
                (Some(email), _) => {
                    commands::cmd_sync_user(&db, services, &email, max_results, window_days)
                        .await
                }
                (None, true) => commands::cmd_sync_all(&db, services).await,
                (None, false) => Err(anyhow::anyhow!("Pass --user EMAIL or --all")),
            }
        }
        Commands::Parse { file } => commands::cmd_parse(&file),
        Commands::Pending { user } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_pending(&db, &user)
        }
        Commands::Confirm { user, ids, all } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_confirm(&db, &user, &ids, all)
        }
        Commands::Expenses { user, limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_expenses(&db, &user, limit)
        }
        Commands::Merchants { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(MerchantsAction::List) => commands::cmd_merchants_list(&db),
                Some(MerchantsAction::Add { alias, canonical }) => {
                    commands::cmd_merchants_add(&db, &alias, &canonical)
                }
                Some(MerchantsAction::Test { raw }) => commands::cmd_merchants_test(&db, &raw),
            }
        }
        Commands::Notifications { user, unread } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_notifications(&db, &user, unread)
        }
    }
}
