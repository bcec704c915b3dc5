//! Stored Gmail OAuth tokens

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{format_datetime, parse_datetime, Database};
use crate::error::Result;
use crate::models::GmailToken;

impl Database {
    /// Store a freshly granted credential, reactivating any previous one
    pub fn save_gmail_token(
        &self,
        user_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO gmail_tokens (user_id, access_token, refresh_token, expires_at, is_active)
            VALUES (?, ?, ?, ?, 1)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, gmail_tokens.refresh_token),
                expires_at = excluded.expires_at,
                is_active = 1,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![user_id, access_token, refresh_token, format_datetime(&expires_at)],
        )?;
        Ok(())
    }

    /// Get the stored credential, active or not
    pub fn get_gmail_token(&self, user_id: i64) -> Result<Option<GmailToken>> {
        let conn = self.conn()?;
        let token = conn
            .query_row(
                "SELECT user_id, access_token, refresh_token, expires_at, last_fetch_at, is_active
                 FROM gmail_tokens WHERE user_id = ?",
                params![user_id],
                |row| {
                    let expires_at: String = row.get(3)?;
                    let last_fetch_at: Option<String> = row.get(4)?;
                    Ok(GmailToken {
                        user_id: row.get(0)?,
                        access_token: row.get(1)?,
                        refresh_token: row.get(2)?,
                        expires_at: parse_datetime(3, &expires_at)?,
                        last_fetch_at: last_fetch_at
                            .map(|s| parse_datetime(4, &s))
                            .transpose()?,
                        is_active: row.get::<_, i64>(5)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(token)
    }

    /// Replace the access token after a refresh
    pub fn update_access_token(
        &self,
        user_id: i64,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE gmail_tokens SET access_token = ?, expires_at = ?, updated_at = CURRENT_TIMESTAMP
             WHERE user_id = ?",
            params![access_token, format_datetime(&expires_at), user_id],
        )?;
        Ok(())
    }

    /// Mark the credential unusable; false if there was no active credential
    pub fn deactivate_gmail_token(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE gmail_tokens SET is_active = 0, updated_at = CURRENT_TIMESTAMP
             WHERE user_id = ? AND is_active = 1",
            params![user_id],
        )?;
        Ok(updated > 0)
    }

    /// Remove the credential entirely
    pub fn delete_gmail_token(&self, user_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM gmail_tokens WHERE user_id = ?", params![user_id])?;
        Ok(deleted > 0)
    }

    /// Stamp the time of the last successful fetch
    pub fn mark_gmail_fetched(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE gmail_tokens SET last_fetch_at = ? WHERE user_id = ?",
            params![format_datetime(&at), user_id],
        )?;
        Ok(())
    }

    /// Users with an active credential, in id order
    pub fn list_active_gmail_users(&self) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT user_id FROM gmail_tokens WHERE is_active = 1 ORDER BY user_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}
