//! Notification storage

use rusqlite::params;

use super::{parse_datetime, parse_text, Database};
use crate::error::Result;
use crate::models::{NewNotification, Notification};

impl Database {
    /// Create a notification, returning its id
    pub fn create_notification(&self, notification: &NewNotification) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notifications (user_id, type, title, message, action_url) VALUES (?, ?, ?, ?, ?)",
            params![
                notification.user_id,
                notification.notification_type.as_str(),
                notification.title,
                notification.message,
                notification.action_url,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The user's notifications, newest first
    pub fn list_notifications(&self, user_id: i64, unread_only: bool) -> Result<Vec<Notification>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, type, title, message, action_url, is_read, created_at
            FROM notifications
            WHERE user_id = ? AND (? = 0 OR is_read = 0)
            ORDER BY created_at DESC, id DESC
            "#,
        )?;

        let notifications = stmt
            .query_map(params![user_id, unread_only], |row| {
                let kind: String = row.get(2)?;
                let created_at: String = row.get(7)?;
                Ok(Notification {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    notification_type: parse_text(2, &kind)?,
                    title: row.get(3)?,
                    message: row.get(4)?,
                    action_url: row.get(5)?,
                    is_read: row.get::<_, i64>(6)? != 0,
                    created_at: parse_datetime(7, &created_at)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(notifications)
    }

    /// Mark one of the user's notifications read
    pub fn mark_notification_read(&self, user_id: i64, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        Ok(updated > 0)
    }
}
