//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `users` - Users and per-user sync state (processed message ids)
//! - `pending` - Pending transactions staged from email
//! - `expenses` - The expense ledger
//! - `credentials` - Stored Gmail OAuth tokens
//! - `notifications` - User-facing notifications
//! - `merchants` - Runtime merchant aliases
//! - `audit` - Audit log

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod audit;
mod credentials;
mod expenses;
mod merchants;
mod notifications;
mod pending;
mod users;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "SPENDMAIL_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"spendmail-salt-1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

/// Parse a stored datetime column; unreadable values are conversion errors
pub(crate) fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    // SQLite CURRENT_TIMESTAMP and format_datetime both use "YYYY-MM-DD HH:MM:SS"
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| conversion_error(idx, format!("Invalid datetime '{}': {}", s, e)))
}

/// Parse a stored enum column through its `FromStr`
pub(crate) fn parse_text<T>(idx: usize, s: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    s.parse().map_err(|e: T::Err| conversion_error(idx, e.to_string()))
}

/// Parse a stored JSON column
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, s: &str) -> rusqlite::Result<T> {
    serde_json::from_str(s).map_err(|e| conversion_error(idx, e))
}

/// Format a datetime the way SQLite's CURRENT_TIMESTAMP does, so stored values compare
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Whether an insert failed on a UNIQUE or PRIMARY KEY constraint
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    /// Whether a key was supplied when opening
    keyed: bool,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `SPENDMAIL_DB_KEY` to be set. The database is encrypted using
    /// SQLCipher with a key derived from the passphrase via Argon2; stored
    /// Gmail tokens are only ever at rest inside the encrypted file.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: Gmail tokens are stored in plain text. Development and tests only.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);

            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                Ok(())
            });

            Pool::builder().max_size(10).build(manager)?
        } else {
            let manager =
                manager.with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
            Pool::builder().max_size(10).build(manager)?
        };

        let db = Self {
            pool,
            db_path: path.to_string(),
            keyed: passphrase.is_some(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because every pooled
    /// connection must see the same database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir()
            .join(format!("spendmail_test_{}_{}.db", std::process::id(), id))
            .to_string_lossy()
            .into_owned();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && self.keyed)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Users, identified by the email the auth proxy vouches for
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                is_admin INTEGER NOT NULL DEFAULT 0,
                last_auto_sync_at DATETIME,
                last_sync_error TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Append-only set of message ids each user's syncs have handled
            CREATE TABLE IF NOT EXISTS processed_messages (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                message_id TEXT NOT NULL,
                processed_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, message_id)
            );

            -- Transactions parsed from email, awaiting review
            CREATE TABLE IF NOT EXISTS pending_transactions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                source_message_id TEXT NOT NULL,
                amount REAL NOT NULL,
                direction TEXT NOT NULL,                 -- debit, credit
                vendor TEXT NOT NULL,
                raw_vendor TEXT NOT NULL,
                date DATETIME NOT NULL,
                reference_id TEXT,
                confidence TEXT NOT NULL,                -- low, medium, high
                metadata TEXT NOT NULL DEFAULT '{}',     -- JSON: extraction metadata
                category TEXT NOT NULL DEFAULT 'Uncategorized',
                description TEXT NOT NULL DEFAULT '',
                is_confirmed INTEGER NOT NULL DEFAULT 0,
                confirmed_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, source_message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_pending_user_confirmed
                ON pending_transactions(user_id, is_confirmed, created_at);

            -- Expense ledger
            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                description TEXT NOT NULL,
                amount REAL NOT NULL,
                category TEXT NOT NULL,
                date DATETIME NOT NULL,
                payment_method TEXT NOT NULL DEFAULT 'UPI',
                tags TEXT NOT NULL DEFAULT '[]',         -- JSON array
                notes TEXT,
                source_message_id TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_expenses_source_message
                ON expenses(user_id, source_message_id) WHERE source_message_id IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_expenses_user_date ON expenses(user_id, date);

            -- Gmail OAuth credentials, one per user
            CREATE TABLE IF NOT EXISTS gmail_tokens (
                user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at DATETIME NOT NULL,
                last_fetch_at DATETIME,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- User-facing notifications
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                type TEXT NOT NULL,                      -- gmail_reconnect, gmail_sync
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                action_url TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read);

            -- Merchant aliases added at runtime (layered over the built-in table)
            CREATE TABLE IF NOT EXISTS merchant_aliases (
                id INTEGER PRIMARY KEY,
                alias TEXT NOT NULL UNIQUE,
                canonical_name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Audit log
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                user_email TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id INTEGER,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

/// Audit log entry
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub user_email: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
}
