//! Pending transaction operations
//!
//! Rows are keyed by (user_id, source_message_id); the UNIQUE constraint is
//! what keeps two overlapping syncs from staging the same email twice.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension};

use super::{
    format_datetime, is_unique_violation, parse_datetime, parse_json, parse_text, Database,
};
use crate::error::{Error, Result};
use crate::models::{round_amount, NewPendingTransaction, PendingTransaction, PendingUpdate};

const PENDING_COLUMNS: &str = "id, user_id, source_message_id, amount, direction, vendor, raw_vendor, date,
     reference_id, confidence, metadata, category, description, is_confirmed, confirmed_at, created_at";

impl Database {
    /// Insert a pending transaction
    ///
    /// Returns `None` when a row for the same (user, message) already exists.
    pub fn insert_pending(&self, tx: &NewPendingTransaction) -> Result<Option<PendingTransaction>> {
        let conn = self.conn()?;

        let inserted = conn.execute(
            r#"
            INSERT INTO pending_transactions
                (user_id, source_message_id, amount, direction, vendor, raw_vendor, date,
                 reference_id, confidence, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.user_id,
                tx.source_message_id,
                tx.amount,
                tx.direction.as_str(),
                tx.vendor,
                tx.raw_vendor,
                format_datetime(&tx.date),
                tx.reference_id,
                tx.confidence.as_str(),
                tx.metadata.to_string(),
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_pending(tx.user_id, id)
    }

    /// Whether a pending row (confirmed or not) exists for this message
    pub fn pending_exists(&self, user_id: i64, source_message_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM pending_transactions WHERE user_id = ? AND source_message_id = ?)",
            params![user_id, source_message_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Get one of the user's pending rows by id
    pub fn get_pending(&self, user_id: i64, id: i64) -> Result<Option<PendingTransaction>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM pending_transactions WHERE id = ? AND user_id = ?",
                    PENDING_COLUMNS
                ),
                params![id, user_id],
                Self::row_to_pending,
            )
            .optional()?;
        Ok(row)
    }

    /// Unconfirmed rows for the user, newest first
    pub fn list_pending(&self, user_id: i64) -> Result<Vec<PendingTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_transactions
             WHERE user_id = ? AND is_confirmed = 0
             ORDER BY date DESC, id DESC",
            PENDING_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![user_id], Self::row_to_pending)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Unconfirmed rows of the user among the given ids; other ids are ignored
    pub fn list_unconfirmed_by_ids(
        &self,
        user_id: i64,
        ids: &[i64],
    ) -> Result<Vec<PendingTransaction>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_transactions
             WHERE user_id = ? AND is_confirmed = 0 AND id IN ({})
             ORDER BY id",
            PENDING_COLUMNS, placeholders
        ))?;

        let mut values: Vec<i64> = Vec::with_capacity(ids.len() + 1);
        values.push(user_id);
        values.extend_from_slice(ids);

        let rows = stmt
            .query_map(params_from_iter(values), Self::row_to_pending)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Apply a partial update to an unconfirmed row
    ///
    /// Returns `None` if the row does not exist, belongs to another user or
    /// is already confirmed.
    pub fn update_pending(
        &self,
        user_id: i64,
        id: i64,
        update: &PendingUpdate,
    ) -> Result<Option<PendingTransaction>> {
        let amount = update
            .amount
            .map(|a| {
                round_amount(a).ok_or_else(|| {
                    Error::InvalidData(format!("Amount must be positive, got {}", a))
                })
            })
            .transpose()?;
        let conn = self.conn()?;

        let updated = conn.execute(
            r#"
            UPDATE pending_transactions SET
                vendor = COALESCE(?, vendor),
                category = COALESCE(?, category),
                amount = COALESCE(?, amount),
                date = COALESCE(?, date),
                description = COALESCE(?, description)
            WHERE id = ? AND user_id = ? AND is_confirmed = 0
            "#,
            params![
                update.vendor,
                update.category,
                amount,
                update.date.as_ref().map(format_datetime),
                update.description,
                id,
                user_id,
            ],
        )?;

        if updated == 0 {
            return Ok(None);
        }
        drop(conn);
        self.get_pending(user_id, id)
    }

    /// Delete an unconfirmed row; false if nothing matched
    pub fn delete_pending(&self, user_id: i64, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM pending_transactions WHERE id = ? AND user_id = ? AND is_confirmed = 0",
            params![id, user_id],
        )?;
        Ok(deleted > 0)
    }

    /// Flip a row to confirmed; false if it was already confirmed
    pub fn mark_pending_confirmed(
        &self,
        user_id: i64,
        id: i64,
        confirmed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE pending_transactions SET is_confirmed = 1, confirmed_at = ?
             WHERE id = ? AND user_id = ? AND is_confirmed = 0",
            params![format_datetime(&confirmed_at), id, user_id],
        )?;
        Ok(updated > 0)
    }

    /// Delete every unconfirmed row of the user, returning how many went
    pub fn delete_unconfirmed_pending(&self, user_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM pending_transactions WHERE user_id = ? AND is_confirmed = 0",
            params![user_id],
        )?;
        Ok(deleted)
    }

    /// Helper to convert a row to PendingTransaction (column order: PENDING_COLUMNS)
    fn row_to_pending(row: &rusqlite::Row) -> rusqlite::Result<PendingTransaction> {
        let direction: String = row.get(4)?;
        let date: String = row.get(7)?;
        let confidence: String = row.get(9)?;
        let metadata: String = row.get(10)?;
        let confirmed_at: Option<String> = row.get(14)?;
        let created_at: String = row.get(15)?;

        Ok(PendingTransaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            source_message_id: row.get(2)?,
            amount: row.get(3)?,
            direction: parse_text(4, &direction)?,
            vendor: row.get(5)?,
            raw_vendor: row.get(6)?,
            date: parse_datetime(7, &date)?,
            reference_id: row.get(8)?,
            confidence: parse_text(9, &confidence)?,
            metadata: parse_json(10, &metadata)?,
            category: row.get(11)?,
            description: row.get(12)?,
            is_confirmed: row.get::<_, i64>(13)? != 0,
            confirmed_at: confirmed_at
                .map(|s| parse_datetime(14, &s))
                .transpose()?,
            created_at: parse_datetime(15, &created_at)?,
        })
    }
}
