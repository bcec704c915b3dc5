//! Expense ledger operations

use rusqlite::{params, OptionalExtension};

use super::{format_datetime, is_unique_violation, parse_datetime, parse_json, Database};
use crate::error::Result;
use crate::models::{Expense, NewExpense};

const EXPENSE_COLUMNS: &str = "id, user_id, description, amount, category, date, payment_method, tags,
     notes, source_message_id, created_at";

impl Database {
    /// Insert an expense
    ///
    /// Returns `None` if an expense for the same (user, source message) exists.
    pub fn insert_expense(&self, expense: &NewExpense) -> Result<Option<Expense>> {
        let conn = self.conn()?;

        let inserted = conn.execute(
            r#"
            INSERT INTO expenses
                (user_id, description, amount, category, date, payment_method, tags, notes, source_message_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                expense.user_id,
                expense.description,
                expense.amount,
                expense.category,
                format_datetime(&expense.date),
                expense.payment_method,
                serde_json::to_string(&expense.tags)?,
                expense.notes,
                expense.source_message_id,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        drop(conn);
        self.get_expense(id)
    }

    /// Whether the ledger already holds an expense from this message
    pub fn expense_exists(&self, user_id: i64, source_message_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM expenses WHERE user_id = ? AND source_message_id = ?)",
            params![user_id, source_message_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Get an expense by id
    pub fn get_expense(&self, id: i64) -> Result<Option<Expense>> {
        let conn = self.conn()?;
        let expense = conn
            .query_row(
                &format!("SELECT {} FROM expenses WHERE id = ?", EXPENSE_COLUMNS),
                params![id],
                Self::row_to_expense,
            )
            .optional()?;
        Ok(expense)
    }

    /// The user's expenses, newest first
    pub fn list_expenses(&self, user_id: i64, limit: i64) -> Result<Vec<Expense>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM expenses WHERE user_id = ? ORDER BY date DESC, id DESC LIMIT ?",
            EXPENSE_COLUMNS
        ))?;
        let expenses = stmt
            .query_map(params![user_id, limit], Self::row_to_expense)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(expenses)
    }

    fn row_to_expense(row: &rusqlite::Row) -> rusqlite::Result<Expense> {
        let date: String = row.get(5)?;
        let tags: String = row.get(7)?;
        let created_at: String = row.get(10)?;
        Ok(Expense {
            id: row.get(0)?,
            user_id: row.get(1)?,
            description: row.get(2)?,
            amount: row.get(3)?,
            category: row.get(4)?,
            date: parse_datetime(5, &date)?,
            payment_method: row.get(6)?,
            tags: parse_json(7, &tags)?,
            notes: row.get(8)?,
            source_message_id: row.get(9)?,
            created_at: parse_datetime(10, &created_at)?,
        })
    }
}
