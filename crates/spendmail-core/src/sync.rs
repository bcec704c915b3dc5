//! Sync orchestration: fetch -> extract -> normalize -> stage
//!
//! One run handles one user. Only a failure to reach the mailbox aborts the
//! run; anything that goes wrong with a single message is recorded in
//! [`SyncStats::errors`] and the run moves on.
//!
//! Bookkeeping is at-least-once. The processed-id set and the last-sync
//! timestamp are written together in one transaction at the end of a
//! successful run. A run that dies earlier leaves its staged rows in place
//! and their ids unrecorded; the next run re-extracts those messages and
//! staging reports them as skipped.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{GmailConfig, DEFAULT_SENDER_PATTERNS};
use crate::db::Database;
use crate::error::Result;
use crate::extract::extract_transaction;
use crate::gmail::{FetchQuery, MailFetcher};
use crate::models::{RawEmailMessage, SyncError, SyncOptions, SyncStats};
use crate::normalize::MerchantNormalizer;
use crate::staging::{stage_candidate, StagingMode};

/// Subject keywords that make a message worth fetching regardless of sender
const SUBJECT_KEYWORDS: &[&str] = &["debited", "credited", "transaction", "payment", "UPI"];

/// What happened to one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Not a transaction email
    Ignored,
    /// Parsed and written
    Saved,
    /// Parsed, but already staged or imported, or a credit in auto-confirm mode
    Skipped,
}

/// Build the Gmail search expression for a sync
///
/// `(from:(a OR b) OR subject:(debited OR ...)) newer_than:Nd`
pub fn build_relevance_query(senders: &[String], window_days: u32) -> String {
    let subjects = SUBJECT_KEYWORDS.join(" OR ");
    let senders: Vec<&str> = senders
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if senders.is_empty() {
        format!("subject:({}) newer_than:{}d", subjects, window_days)
    } else {
        format!(
            "(from:({}) OR subject:({})) newer_than:{}d",
            senders.join(" OR "),
            subjects,
            window_days
        )
    }
}

/// Runs the ingestion pipeline for one user at a time
#[derive(Clone)]
pub struct SyncOrchestrator {
    db: Database,
    fetcher: Arc<dyn MailFetcher>,
    normalizer: MerchantNormalizer,
    mode: StagingMode,
    allowed_senders: Vec<String>,
}

impl SyncOrchestrator {
    /// Review mode, default sender list
    pub fn new(db: Database, fetcher: Arc<dyn MailFetcher>, normalizer: MerchantNormalizer) -> Self {
        Self {
            db,
            fetcher,
            normalizer,
            mode: StagingMode::Review,
            allowed_senders: DEFAULT_SENDER_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Orchestrator configured from [`GmailConfig`], normalizing against the
    /// database-backed merchant dictionary
    pub fn from_config(db: Database, fetcher: Arc<dyn MailFetcher>, config: &GmailConfig) -> Self {
        let normalizer = MerchantNormalizer::new(Arc::new(db.clone()));
        Self::new(db, fetcher, normalizer)
            .with_staging_mode(config.staging_mode())
            .with_allowed_senders(config.allowed_senders.clone())
    }

    pub fn with_staging_mode(mut self, mode: StagingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_allowed_senders(mut self, senders: Vec<String>) -> Self {
        self.allowed_senders = senders;
        self
    }

    pub fn normalizer(&self) -> &MerchantNormalizer {
        &self.normalizer
    }

    /// Sync one user's mailbox
    ///
    /// Fails only if the mailbox cannot be fetched (credential or network
    /// errors) or the final bookkeeping write fails.
    pub async fn sync_user(&self, user_id: i64, options: SyncOptions) -> Result<SyncStats> {
        let processed = self.db.processed_message_ids(user_id)?;

        let query = FetchQuery {
            max_results: options.max_results,
            window_days: options.window_days,
            query: build_relevance_query(&self.allowed_senders, options.window_days),
        };

        let messages = match self.fetcher.fetch_messages(user_id, &query).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(user_id, error = %e, "Gmail fetch failed");
                if let Err(db_err) = self.db.set_sync_error(user_id, &e.to_string()) {
                    warn!(user_id, error = %db_err, "Failed to record sync error");
                }
                return Err(e);
            }
        };

        let mut stats = SyncStats {
            fetched: messages.len(),
            ..Default::default()
        };
        let mut handled = Vec::with_capacity(messages.len());

        for message in &messages {
            if processed.contains(&message.id) {
                debug!(user_id, message_id = %message.id, "Already processed");
                stats.skipped += 1;
                continue;
            }

            match self.process_message(user_id, message) {
                Ok(outcome) => {
                    match outcome {
                        Outcome::Ignored => {}
                        Outcome::Saved => {
                            stats.parsed += 1;
                            stats.saved += 1;
                        }
                        Outcome::Skipped => {
                            stats.parsed += 1;
                            stats.skipped += 1;
                        }
                    }
                    handled.push(message.id.clone());
                }
                Err(e) => {
                    warn!(user_id, message_id = %message.id, error = %e, "Failed to process message");
                    stats.errors.push(SyncError {
                        id: message.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let now = Utc::now();
        self.db.record_sync(user_id, &handled, now)?;
        self.db.mark_gmail_fetched(user_id, now)?;

        info!(
            user_id,
            fetched = stats.fetched,
            parsed = stats.parsed,
            saved = stats.saved,
            skipped = stats.skipped,
            errors = stats.errors.len(),
            "Gmail sync complete"
        );
        Ok(stats)
    }

    fn process_message(&self, user_id: i64, message: &RawEmailMessage) -> Result<Outcome> {
        let Some(candidate) = extract_transaction(message)? else {
            return Ok(Outcome::Ignored);
        };

        let vendor = self.normalizer.normalize(&candidate.raw_vendor);
        let confidence = candidate.confidence.combine(vendor.confidence);

        match stage_candidate(&self.db, user_id, &candidate, &vendor, confidence, self.mode)? {
            Some(_) => {
                debug!(user_id, message_id = %message.id, vendor = %vendor.vendor, "Staged transaction");
                Ok(Outcome::Saved)
            }
            None => Ok(Outcome::Skipped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmail::mock::{sample_message, MockMailFetcher};
    use crate::models::{Confidence, Direction, MessageBody};

    fn setup() -> (Database, Arc<MockMailFetcher>, SyncOrchestrator, i64) {
        let db = Database::in_memory().unwrap();
        let user = db.get_or_create_user("alice@example.com").unwrap();
        let fetcher = Arc::new(MockMailFetcher::new());
        let orchestrator =
            SyncOrchestrator::new(db.clone(), fetcher.clone(), MerchantNormalizer::builtin());
        (db, fetcher, orchestrator, user.id)
    }

    fn swiggy() -> RawEmailMessage {
        sample_message(
            "m-swiggy",
            "Alert: Debit transaction",
            "HDFC Bank <alerts@hdfcbank.net>",
            "Rs.1,250.00 debited for UPI payment to SWIGGY on 12-05",
        )
    }

    fn otp() -> RawEmailMessage {
        sample_message(
            "m-otp",
            "Your login code",
            "alerts@hdfcbank.net",
            "Your OTP is 482913 for a transaction of Rs.500. Do not share it.",
        )
    }

    #[test]
    fn test_relevance_query() {
        let senders = vec!["alerts@hdfcbank.net".to_string(), "paytm.com".to_string()];
        assert_eq!(
            build_relevance_query(&senders, 30),
            "(from:(alerts@hdfcbank.net OR paytm.com) OR subject:(debited OR credited OR transaction OR payment OR UPI)) newer_than:30d"
        );
        assert_eq!(
            build_relevance_query(&[], 7),
            "subject:(debited OR credited OR transaction OR payment OR UPI) newer_than:7d"
        );
    }

    #[tokio::test]
    async fn test_sync_stages_transaction() {
        let (db, fetcher, orchestrator, user_id) = setup();
        fetcher.set_messages(user_id, vec![swiggy(), otp()]);

        let stats = orchestrator
            .sync_user(user_id, SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.parsed, 1);
        assert_eq!(stats.saved, 1);
        assert_eq!(stats.skipped, 0);
        assert!(stats.errors.is_empty());

        let pending = db.list_pending(user_id).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].vendor, "Swiggy");
        assert_eq!(pending[0].amount, 1250.0);
        assert_eq!(pending[0].direction, Direction::Debit);
        // Extractor says medium, normalizer says high: the worse one wins
        assert_eq!(pending[0].confidence, Confidence::Medium);

        let processed = db.processed_message_ids(user_id).unwrap();
        assert!(processed.contains("m-swiggy"));
        assert!(processed.contains("m-otp"));

        let query = fetcher.last_query(user_id).unwrap();
        assert_eq!(query.max_results, 50);
        assert!(query.query.ends_with("newer_than:30d"));

        let user = db.get_user(user_id).unwrap().unwrap();
        assert!(user.last_auto_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_second_sync_skips() {
        let (db, fetcher, orchestrator, user_id) = setup();
        fetcher.set_messages(user_id, vec![swiggy()]);

        let first = orchestrator.sync_user(user_id, SyncOptions::default()).await.unwrap();
        assert_eq!((first.saved, first.skipped), (1, 0));

        let second = orchestrator.sync_user(user_id, SyncOptions::default()).await.unwrap();
        assert_eq!((second.saved, second.skipped), (0, 1));
        assert_eq!(db.list_pending(user_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_staged_but_unrecorded_message_is_skipped() {
        let (db, fetcher, orchestrator, user_id) = setup();
        fetcher.set_messages(user_id, vec![swiggy()]);
        orchestrator.sync_user(user_id, SyncOptions::default()).await.unwrap();

        // Simulate a run that staged the row but died before its bookkeeping
        db.conn()
            .unwrap()
            .execute("DELETE FROM processed_messages", [])
            .unwrap();

        let stats = orchestrator.sync_user(user_id, SyncOptions::default()).await.unwrap();
        assert_eq!((stats.parsed, stats.saved, stats.skipped), (1, 0, 1));
    }

    #[tokio::test]
    async fn test_bad_message_does_not_abort_batch() {
        let (db, fetcher, orchestrator, user_id) = setup();
        let mut broken = sample_message("m-broken", "Debit alert", "alerts@hdfcbank.net", "");
        broken.payload.body = MessageBody {
            size: 10,
            data: Some("***not base64***".to_string()),
        };
        fetcher.set_messages(user_id, vec![broken, swiggy()]);

        let stats = orchestrator.sync_user(user_id, SyncOptions::default()).await.unwrap();

        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.saved, 1);
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].id, "m-broken");

        // Failed messages are retried on the next run
        let processed = db.processed_message_ids(user_id).unwrap();
        assert!(!processed.contains("m-broken"));
        assert!(processed.contains("m-swiggy"));
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates_and_is_recorded() {
        let (db, fetcher, orchestrator, user_id) = setup();
        fetcher.fail_with_status(user_id, 401, "Invalid Credentials");

        let err = orchestrator
            .sync_user(user_id, SyncOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_credential_error());

        let user = db.get_user(user_id).unwrap().unwrap();
        assert!(user.last_sync_error.unwrap().contains("401"));
        assert!(user.last_auto_sync_at.is_none());
    }

    #[tokio::test]
    async fn test_success_clears_previous_error() {
        let (db, fetcher, orchestrator, user_id) = setup();
        db.set_sync_error(user_id, "boom").unwrap();
        fetcher.set_messages(user_id, vec![]);

        orchestrator.sync_user(user_id, SyncOptions::default()).await.unwrap();
        assert!(db.get_user(user_id).unwrap().unwrap().last_sync_error.is_none());
    }

    #[tokio::test]
    async fn test_auto_confirm_mode() {
        let (db, fetcher, orchestrator, user_id) = setup();
        let orchestrator = orchestrator.with_staging_mode(StagingMode::AutoConfirm);
        let credit = sample_message(
            "m-credit",
            "Account credited",
            "alerts@hdfcbank.net",
            "Rs.2,000.00 credited to your account from RAHUL",
        );
        fetcher.set_messages(user_id, vec![swiggy(), credit]);

        let stats = orchestrator.sync_user(user_id, SyncOptions::default()).await.unwrap();

        assert_eq!(stats.parsed, 2);
        assert_eq!(stats.saved, 1);
        assert_eq!(stats.skipped, 1);
        assert!(db.list_pending(user_id).unwrap().is_empty());
        let expenses = db.list_expenses(user_id, 10).unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].description, "Swiggy transaction");
    }

    #[tokio::test]
    async fn test_runtime_merchant_alias_is_used() {
        let (db, fetcher, _, user_id) = setup();
        let orchestrator = SyncOrchestrator::from_config(db.clone(), fetcher.clone(), &GmailConfig::default());
        orchestrator
            .normalizer()
            .add_merchant("sharma kirana", "Sharma Kirana Store")
            .unwrap();

        fetcher.set_messages(
            user_id,
            vec![sample_message(
                "m-kirana",
                "Debit alert",
                "alerts@hdfcbank.net",
                "Rs.340.00 debited for UPI payment to SHARMA KIRANA on 14-05",
            )],
        );
        orchestrator.sync_user(user_id, SyncOptions::default()).await.unwrap();

        let pending = db.list_pending(user_id).unwrap();
        assert_eq!(pending[0].vendor, "Sharma Kirana Store");
    }
}
