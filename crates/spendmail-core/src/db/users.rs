//! Users and per-user sync state

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::User;

impl Database {
    /// Get a user by email, creating the row on first sight
    pub fn get_or_create_user(&self, email: &str) -> Result<User> {
        let conn = self.conn()?;
        let email = email.trim().to_lowercase();

        conn.execute(
            "INSERT INTO users (email) VALUES (?) ON CONFLICT(email) DO NOTHING",
            params![email],
        )?;

        let user = conn.query_row(
            "SELECT id, email, is_admin, last_auto_sync_at, last_sync_error, created_at
             FROM users WHERE email = ?",
            params![email],
            Self::row_to_user,
        )?;

        Ok(user)
    }

    /// Get a user by id
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, email, is_admin, last_auto_sync_at, last_sync_error, created_at
                 FROM users WHERE id = ?",
                params![id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// List all users
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, email, is_admin, last_auto_sync_at, last_sync_error, created_at
             FROM users ORDER BY id",
        )?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Grant or remove admin rights
    pub fn set_admin(&self, user_id: i64, is_admin: bool) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE users SET is_admin = ? WHERE id = ?",
            params![is_admin, user_id],
        )?;
        Ok(updated > 0)
    }

    /// Message ids already handled by this user's syncs
    pub fn processed_message_ids(&self, user_id: i64) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT message_id FROM processed_messages WHERE user_id = ?")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    /// Record the end of a successful sync
    ///
    /// Adds the handled message ids to the processed set, stamps the last sync
    /// time and clears the last sync error, all in one transaction.
    pub fn record_sync(
        &self,
        user_id: i64,
        message_ids: &[String],
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO processed_messages (user_id, message_id) VALUES (?, ?)",
            )?;
            for id in message_ids {
                stmt.execute(params![user_id, id])?;
            }
        }

        tx.execute(
            "UPDATE users SET last_auto_sync_at = ?, last_sync_error = NULL WHERE id = ?",
            params![format_datetime(&synced_at), user_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Remember why the last sync failed
    pub fn set_sync_error(&self, user_id: i64, error: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET last_sync_error = ? WHERE id = ?",
            params![error, user_id],
        )?;
        Ok(())
    }

    /// Helper to convert a row to User
    /// Column order: id, email, is_admin, last_auto_sync_at, last_sync_error, created_at
    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let last_sync: Option<String> = row.get(3)?;
        let created_at: String = row.get(5)?;
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            is_admin: row.get::<_, i64>(2)? != 0,
            last_auto_sync_at: last_sync.map(|s| parse_datetime(3, &s)).transpose()?,
            last_sync_error: row.get(4)?,
            created_at: parse_datetime(5, &created_at)?,
        })
    }
}
