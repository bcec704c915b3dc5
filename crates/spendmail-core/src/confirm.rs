//! Confirmation of pending transactions into the ledger

use chrono::Utc;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::Result;
use crate::models::{ConfirmResult, Direction, NewExpense};

/// Confirm a batch of the user's pending transactions
///
/// Only unconfirmed rows owned by the user are considered; other ids are
/// ignored. Debits become expenses (once per source message), credits are
/// confirmed without a ledger entry. Repeating a call is a no-op for rows it
/// already confirmed.
pub fn confirm_transactions(db: &Database, user_id: i64, ids: &[i64]) -> Result<ConfirmResult> {
    let rows = db.list_unconfirmed_by_ids(user_id, ids)?;
    let now = Utc::now();
    let mut result = ConfirmResult::default();

    for row in rows {
        if row.direction == Direction::Debit
            && !db.expense_exists(user_id, &row.source_message_id)?
        {
            let expense = NewExpense::from_email(
                user_id,
                &row.vendor,
                &row.description,
                &row.category,
                row.amount,
                row.date,
                row.reference_id.as_deref(),
                &row.source_message_id,
            );
            if db.insert_expense(&expense)?.is_some() {
                result.expenses_created += 1;
            }
        }

        if db.mark_pending_confirmed(user_id, row.id, now)? {
            result.confirmed += 1;
        } else {
            debug!(user_id, pending_id = row.id, "Already confirmed by a concurrent call");
        }
    }

    info!(
        user_id,
        requested = ids.len(),
        confirmed = result.confirmed,
        expenses_created = result.expenses_created,
        "Confirmed pending transactions"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, NewPendingTransaction, PendingUpdate, GMAIL_TAG};
    use chrono::TimeZone;

    fn stage(db: &Database, user_id: i64, message_id: &str, amount: f64, direction: Direction) -> i64 {
        db.insert_pending(&NewPendingTransaction {
            user_id,
            source_message_id: message_id.to_string(),
            amount,
            direction,
            vendor: "Netflix".to_string(),
            raw_vendor: "NETFLIX".to_string(),
            date: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            reference_id: Some("REF123".to_string()),
            confidence: Confidence::High,
            metadata: serde_json::json!({}),
        })
        .unwrap()
        .unwrap()
        .id
    }

    #[test]
    fn test_debit_becomes_expense_credit_does_not() {
        let db = Database::in_memory().unwrap();
        let user = db.get_or_create_user("alice@example.com").unwrap().id;
        let debit = stage(&db, user, "m1", 499.0, Direction::Debit);
        let credit = stage(&db, user, "m2", 1000.0, Direction::Credit);

        let result = confirm_transactions(&db, user, &[debit, credit]).unwrap();
        assert_eq!(result.confirmed, 2);
        assert_eq!(result.expenses_created, 1);

        let expenses = db.list_expenses(user, 10).unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].amount, 499.0);
        assert_eq!(expenses[0].description, "Netflix transaction");
        assert_eq!(expenses[0].category, "Uncategorized");
        assert_eq!(expenses[0].tags, vec![GMAIL_TAG.to_string()]);
        assert_eq!(expenses[0].notes.as_deref(), Some("Imported from Gmail. Ref: REF123"));
        assert_eq!(expenses[0].source_message_id.as_deref(), Some("m1"));

        let row = db.get_pending(user, credit).unwrap().unwrap();
        assert!(row.is_confirmed);
        assert!(row.confirmed_at.is_some());
        assert!(db.list_pending(user).unwrap().is_empty());
    }

    #[test]
    fn test_confirm_twice_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let user = db.get_or_create_user("alice@example.com").unwrap().id;
        let id = stage(&db, user, "m1", 499.0, Direction::Debit);

        confirm_transactions(&db, user, &[id]).unwrap();
        let again = confirm_transactions(&db, user, &[id]).unwrap();

        assert_eq!(again, ConfirmResult::default());
        assert_eq!(db.list_expenses(user, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_edits_carry_into_expense() {
        let db = Database::in_memory().unwrap();
        let user = db.get_or_create_user("alice@example.com").unwrap().id;
        let id = stage(&db, user, "m1", 499.0, Direction::Debit);
        db.update_pending(
            user,
            id,
            &PendingUpdate {
                category: Some("Entertainment".to_string()),
                description: Some("Family plan".to_string()),
                amount: Some(649.0),
                ..Default::default()
            },
        )
        .unwrap();

        confirm_transactions(&db, user, &[id]).unwrap();

        let expense = &db.list_expenses(user, 10).unwrap()[0];
        assert_eq!(expense.category, "Entertainment");
        assert_eq!(expense.description, "Family plan");
        assert_eq!(expense.amount, 649.0);
    }

    #[test]
    fn test_other_users_and_unknown_ids_are_ignored() {
        let db = Database::in_memory().unwrap();
        let alice = db.get_or_create_user("alice@example.com").unwrap().id;
        let bob = db.get_or_create_user("bob@example.com").unwrap().id;
        let alices = stage(&db, alice, "m1", 499.0, Direction::Debit);

        let result = confirm_transactions(&db, bob, &[alices, 9999]).unwrap();
        assert_eq!(result, ConfirmResult::default());
        assert!(!db.get_pending(alice, alices).unwrap().unwrap().is_confirmed);
    }

    #[test]
    fn test_existing_expense_is_not_duplicated() {
        let db = Database::in_memory().unwrap();
        let user = db.get_or_create_user("alice@example.com").unwrap().id;
        let id = stage(&db, user, "m1", 499.0, Direction::Debit);
        db.insert_expense(&NewExpense::from_email(
            user,
            "Netflix",
            "",
            "Uncategorized",
            499.0,
            Utc::now(),
            None,
            "m1",
        ))
        .unwrap();

        let result = confirm_transactions(&db, user, &[id]).unwrap();
        assert_eq!(result.confirmed, 1);
        assert_eq!(result.expenses_created, 0);
        assert_eq!(db.list_expenses(user, 10).unwrap().len(), 1);
    }
}
