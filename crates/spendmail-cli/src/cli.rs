//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// spendmail - Turn bank alert emails into reviewed expenses
#[derive(Parser)]
#[command(name = "spendmail")]
#[command(about = "Gmail transaction-alert ingestion for Indian banks and UPI apps", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "spendmail.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set SPENDMAIL_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the web server (and the scheduled Gmail fetch job)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires Cloudflare Access authentication headers
        /// or an API key from SPENDMAIL_API_KEYS.
        #[arg(long)]
        no_auth: bool,

        /// Directory containing static files to serve
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Show database and Gmail configuration status
    Status,

    /// Manage users
    Users {
        #[command(subcommand)]
        action: Option<UsersAction>,
    },

    /// Store Gmail OAuth tokens for a user
    Connect {
        /// User email
        #[arg(short, long)]
        user: String,

        /// OAuth access token
        #[arg(long)]
        access_token: String,

        /// OAuth refresh token (keeps the stored one if omitted)
        #[arg(long)]
        refresh_token: Option<String>,

        /// Access token lifetime in seconds
        #[arg(long, default_value = "3600")]
        expires_in: i64,
    },

    /// Fetch and stage transactions from Gmail
    Sync {
        /// Sync a single user (by email)
        #[arg(short, long, conflicts_with = "all")]
        user: Option<String>,

        /// Run the scheduled job once for every connected user
        #[arg(long)]
        all: bool,

        /// Maximum messages to fetch
        #[arg(long)]
        max_results: Option<u32>,

        /// How many days back to search
        #[arg(long)]
        window_days: Option<u32>,
    },

    /// Extract a transaction from a raw Gmail message (JSON) without touching the database
    Parse {
        /// File containing a Gmail API message resource
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List pending transactions awaiting review
    Pending {
        /// User email
        #[arg(short, long)]
        user: String,
    },

    /// Confirm pending transactions into the expense ledger
    Confirm {
        /// User email
        #[arg(short, long)]
        user: String,

        /// Pending transaction ids
        #[arg(required_unless_present = "all")]
        ids: Vec<i64>,

        /// Confirm every pending transaction of the user
        #[arg(long)]
        all: bool,
    },

    /// List confirmed expenses
    Expenses {
        /// User email
        #[arg(short, long)]
        user: String,

        /// Number of expenses to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Manage the merchant dictionary
    Merchants {
        #[command(subcommand)]
        action: Option<MerchantsAction>,
    },

    /// Show a user's notifications
    Notifications {
        /// User email
        #[arg(short, long)]
        user: String,

        /// Only unread notifications
        #[arg(long)]
        unread: bool,
    },
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// List users with their Gmail sync state
    List,

    /// Grant or revoke admin access
    Admin {
        /// User email
        email: String,

        /// Revoke instead of grant
        #[arg(long)]
        revoke: bool,
    },
}

#[derive(Subcommand)]
pub enum MerchantsAction {
    /// List runtime aliases
    List,

    /// Add (or replace) an alias
    Add {
        /// Lowercase substring to match in raw vendor names (min 3 characters)
        alias: String,

        /// Canonical merchant name
        canonical: String,
    },

    /// Normalize a raw vendor string with the current dictionary
    Test {
        /// Raw vendor name, e.g. "SWIGGY BANGALORE"
        raw: String,
    },
}
