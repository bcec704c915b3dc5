//! Deduplication and staging of parsed transactions
//!
//! A candidate becomes either a pending row awaiting review or, in
//! auto-confirm mode, a ledger expense. Both paths are idempotent per
//! (user, source message): the existence pre-check is a shortcut and the
//! UNIQUE constraints in the database settle races between overlapping syncs.

use tracing::debug;

use crate::db::Database;
use crate::error::Result;
use crate::models::{
    Confidence, Direction, NewExpense, NewPendingTransaction, NormalizedVendor, StagedRecord,
    TransactionCandidate, DEFAULT_CATEGORY,
};

/// How a staged candidate is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagingMode {
    /// Pending row, confirmed later by the user
    #[default]
    Review,
    /// Debits go straight to the ledger; credits are dropped
    AutoConfirm,
}

/// Stage one candidate for a user
///
/// Returns `None` when the message was already staged or imported, and for
/// credits in auto-confirm mode.
pub fn stage_candidate(
    db: &Database,
    user_id: i64,
    candidate: &TransactionCandidate,
    vendor: &NormalizedVendor,
    confidence: Confidence,
    mode: StagingMode,
) -> Result<Option<StagedRecord>> {
    let message_id = candidate.message_id.as_str();

    if db.pending_exists(user_id, message_id)? || db.expense_exists(user_id, message_id)? {
        debug!(user_id, message_id, "Message already staged");
        return Ok(None);
    }

    match mode {
        StagingMode::AutoConfirm => {
            if candidate.direction == Direction::Credit {
                debug!(user_id, message_id, "Skipping credit in auto-confirm mode");
                return Ok(None);
            }

            let expense = NewExpense::from_email(
                user_id,
                &vendor.vendor,
                "",
                DEFAULT_CATEGORY,
                candidate.amount,
                candidate.date,
                candidate.metadata.reference_id.as_deref(),
                message_id,
            );
            Ok(db.insert_expense(&expense)?.map(StagedRecord::Expense))
        }
        StagingMode::Review => {
            let pending = NewPendingTransaction {
                user_id,
                source_message_id: message_id.to_string(),
                amount: candidate.amount,
                direction: candidate.direction,
                vendor: vendor.vendor.clone(),
                raw_vendor: candidate.raw_vendor.clone(),
                date: candidate.date,
                reference_id: candidate.metadata.reference_id.clone(),
                confidence,
                metadata: serde_json::to_value(&candidate.metadata)?,
            };
            Ok(db.insert_pending(&pending)?.map(StagedRecord::Pending))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AmountSource, CandidateMetadata, GMAIL_TAG};
    use chrono::{TimeZone, Utc};

    fn candidate(message_id: &str, direction: Direction) -> TransactionCandidate {
        TransactionCandidate {
            message_id: message_id.to_string(),
            amount: 499.0,
            direction,
            raw_vendor: "NETFLIX".to_string(),
            date: Utc.with_ymd_and_hms(2024, 5, 12, 8, 0, 0).unwrap(),
            metadata: CandidateMetadata {
                vpa: Some("netflix@icici".to_string()),
                account_last4: Some("1234".to_string()),
                reference_id: Some("412345678901".to_string()),
                subject: "Debit alert".to_string(),
                sender: "alerts@hdfcbank.net".to_string(),
                amount_source: AmountSource::Single,
                direction_confidence: 0.9,
            },
            confidence: Confidence::High,
        }
    }

    fn vendor() -> NormalizedVendor {
        NormalizedVendor {
            vendor: "Netflix".to_string(),
            confidence: Confidence::High,
        }
    }

    fn setup() -> (Database, i64) {
        let db = Database::in_memory().unwrap();
        let user = db.get_or_create_user("alice@example.com").unwrap();
        (db, user.id)
    }

    #[test]
    fn test_review_mode_stages_pending_once() {
        let (db, user_id) = setup();
        let c = candidate("m1", Direction::Debit);

        let first = stage_candidate(&db, user_id, &c, &vendor(), Confidence::High, StagingMode::Review)
            .unwrap();
        let pending = match first {
            Some(StagedRecord::Pending(p)) => p,
            other => panic!("expected pending row, got {:?}", other),
        };
        assert_eq!(pending.vendor, "Netflix");
        assert_eq!(pending.raw_vendor, "NETFLIX");
        assert_eq!(pending.category, "Uncategorized");
        assert_eq!(pending.description, "");
        assert!(!pending.is_confirmed);
        assert_eq!(pending.reference_id.as_deref(), Some("412345678901"));
        assert_eq!(pending.metadata["vpa"], "netflix@icici");

        let second = stage_candidate(&db, user_id, &c, &vendor(), Confidence::High, StagingMode::Review)
            .unwrap();
        assert!(second.is_none());
        assert_eq!(db.list_pending(user_id).unwrap().len(), 1);
    }

    #[test]
    fn test_same_message_for_other_user_is_not_a_duplicate() {
        let (db, alice) = setup();
        let bob = db.get_or_create_user("bob@example.com").unwrap().id;
        let c = candidate("m1", Direction::Debit);

        for user_id in [alice, bob] {
            assert!(
                stage_candidate(&db, user_id, &c, &vendor(), Confidence::High, StagingMode::Review)
                    .unwrap()
                    .is_some()
            );
        }
    }

    #[test]
    fn test_auto_confirm_debit_creates_expense() {
        let (db, user_id) = setup();
        let c = candidate("m1", Direction::Debit);

        let staged =
            stage_candidate(&db, user_id, &c, &vendor(), Confidence::High, StagingMode::AutoConfirm)
                .unwrap();
        let expense = match staged {
            Some(StagedRecord::Expense(e)) => e,
            other => panic!("expected expense, got {:?}", other),
        };
        assert_eq!(expense.amount, 499.0);
        assert_eq!(expense.description, "Netflix transaction");
        assert_eq!(expense.payment_method, "UPI");
        assert_eq!(expense.tags, vec![GMAIL_TAG.to_string()]);
        assert!(expense.notes.unwrap().contains("412345678901"));
        assert!(db.list_pending(user_id).unwrap().is_empty());

        let again =
            stage_candidate(&db, user_id, &c, &vendor(), Confidence::High, StagingMode::AutoConfirm)
                .unwrap();
        assert!(again.is_none());
        assert_eq!(db.list_expenses(user_id, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_auto_confirm_credit_is_noop() {
        let (db, user_id) = setup();
        let c = candidate("m2", Direction::Credit);

        let staged =
            stage_candidate(&db, user_id, &c, &vendor(), Confidence::High, StagingMode::AutoConfirm)
                .unwrap();
        assert!(staged.is_none());
        assert!(db.list_expenses(user_id, 10).unwrap().is_empty());
        assert!(db.list_pending(user_id).unwrap().is_empty());
    }

    #[test]
    fn test_existing_expense_blocks_review_staging() {
        let (db, user_id) = setup();
        let c = candidate("m1", Direction::Debit);
        stage_candidate(&db, user_id, &c, &vendor(), Confidence::High, StagingMode::AutoConfirm)
            .unwrap();

        let staged = stage_candidate(&db, user_id, &c, &vendor(), Confidence::High, StagingMode::Review)
            .unwrap();
        assert!(staged.is_none());
    }
}
