//! Scheduled Gmail fetch job
//!
//! On each trigger every user with an active Gmail credential is synced, a
//! batch of `GMAIL_FETCH_CONCURRENCY` users at a time. Users whose credential
//! has expired or been revoked are deactivated and told to reconnect.
//!
//! The overlap guard is a process-local flag. Running several server
//! instances against one database needs an external lock to avoid duplicate
//! scheduled runs.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use spendmail_core::models::{NewNotification, SyncOptions};
use spendmail_core::{CredentialStore, Database, NotificationSink, SyncOrchestrator};

/// Counts from one run of the job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub users: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Users whose credential was deactivated during this run
    pub deactivated: usize,
    pub saved: usize,
}

/// The scheduled per-user Gmail sync
pub struct GmailFetchJob {
    db: Database,
    orchestrator: SyncOrchestrator,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn NotificationSink>,
    concurrency: usize,
    options: SyncOptions,
    running: AtomicBool,
}

/// Clears the running flag however the run ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl GmailFetchJob {
    pub fn new(
        db: Database,
        orchestrator: SyncOrchestrator,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn NotificationSink>,
        concurrency: usize,
        options: SyncOptions,
    ) -> Self {
        Self {
            db,
            orchestrator,
            credentials,
            notifier,
            concurrency: concurrency.max(1),
            options,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the job once
    ///
    /// Returns `None` without doing anything when a run is already in progress.
    pub async fn run(&self) -> Option<JobSummary> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Gmail fetch job already running, skipping trigger");
            return None;
        }
        let _guard = RunningGuard(&self.running);

        let started = Utc::now();
        let summary = match self.run_batches().await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Gmail fetch job failed");
                JobSummary::default()
            }
        };

        info!(
            users = summary.users,
            succeeded = summary.succeeded,
            failed = summary.failed,
            deactivated = summary.deactivated,
            saved = summary.saved,
            elapsed_ms = (Utc::now() - started).num_milliseconds(),
            "Gmail fetch job finished"
        );
        Some(summary)
    }

    async fn run_batches(&self) -> anyhow::Result<JobSummary> {
        let users = self.db.list_active_gmail_users()?;
        let mut summary = JobSummary {
            users: users.len(),
            ..Default::default()
        };

        for batch in users.chunks(self.concurrency) {
            let mut tasks = JoinSet::new();
            for &user_id in batch {
                let orchestrator = self.orchestrator.clone();
                let options = self.options;
                tasks.spawn(async move { (user_id, orchestrator.sync_user(user_id, options).await) });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((_, Ok(stats))) => {
                        summary.succeeded += 1;
                        summary.saved += stats.saved;
                    }
                    Ok((user_id, Err(e))) if e.is_credential_error() => {
                        summary.failed += 1;
                        warn!(user_id, error = %e, "Gmail credential rejected, deactivating");
                        if self.handle_credential_loss(user_id).await {
                            summary.deactivated += 1;
                        }
                    }
                    Ok((user_id, Err(e))) => {
                        summary.failed += 1;
                        warn!(user_id, error = %e, "Scheduled Gmail sync failed");
                    }
                    Err(e) => {
                        summary.failed += 1;
                        error!(error = %e, "Scheduled Gmail sync task panicked");
                    }
                }
            }
        }

        Ok(summary)
    }

    /// Deactivate the credential and ask the user to reconnect
    ///
    /// Returns whether the credential was deactivated.
    async fn handle_credential_loss(&self, user_id: i64) -> bool {
        let deactivated = match self.credentials.deactivate(user_id).await {
            Ok(()) => true,
            Err(e) => {
                error!(user_id, error = %e, "Failed to deactivate Gmail credential");
                false
            }
        };
        self.notifier
            .notify(NewNotification::gmail_reconnect(user_id))
            .await;
        deactivated
    }
}

/// Parse a cron expression
///
/// Five-field expressions (minute hour day month weekday) follow the
/// classic crontab convention: a leading seconds field of `0` is added and
/// numeric weekdays `0`-`7` (both `0` and `7` are Sunday) are mapped onto the
/// `1`-`7` Sunday-first numbering of the `cron` crate. Six- and seven-field
/// expressions are passed through unchanged. Schedules are evaluated in UTC.
pub fn parse_schedule(expr: &str) -> anyhow::Result<Schedule> {
    let expr = expr.trim();
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let full = if let [minute, hour, day, month, weekday] = fields.as_slice() {
        let weekday = crontab_weekdays(weekday)
            .map_err(|e| anyhow::anyhow!("Invalid GMAIL_CRON_SCHEDULE '{}': {}", expr, e))?;
        format!("0 {} {} {} {} {}", minute, hour, day, month, weekday)
    } else {
        expr.to_string()
    };
    Schedule::from_str(&full)
        .map_err(|e| anyhow::anyhow!("Invalid GMAIL_CRON_SCHEDULE '{}': {}", expr, e))
}

/// Rewrite a crontab weekday field for the `cron` crate
///
/// Names, `*` and `?` are left alone; `*/n` selects the same days under both
/// numberings.
fn crontab_weekdays(field: &str) -> anyhow::Result<String> {
    let items = field
        .split(',')
        .map(|item| {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (item, None),
            };

            let mapped = match range.split_once('-') {
                Some((start, end)) => match (start.parse::<u8>(), end.parse::<u8>()) {
                    (Ok(start), Ok(7)) if start > 0 && start < 7 => {
                        if step.is_some() {
                            anyhow::bail!("stepped weekday range ending at 7 is not supported");
                        }
                        // Sunday wraps around to the start of the week
                        format!("{}-7,1", crontab_weekday(start)?)
                    }
                    (Ok(0), Ok(7)) => "1-7".to_string(),
                    (Ok(start), Ok(end)) => {
                        format!("{}-{}", crontab_weekday(start)?, crontab_weekday(end)?)
                    }
                    _ => range.to_string(),
                },
                None => match range.parse::<u8>() {
                    Ok(day) => crontab_weekday(day)?.to_string(),
                    Err(_) => range.to_string(),
                },
            };

            Ok(match step {
                Some(step) => format!("{}/{}", mapped, step),
                None => mapped,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(items.join(","))
}

fn crontab_weekday(day: u8) -> anyhow::Result<u8> {
    match day {
        0 | 7 => Ok(1),
        1..=6 => Ok(day + 1),
        _ => anyhow::bail!("weekday {} is out of range 0-7", day),
    }
}

/// Start the Gmail fetch scheduler as a background task
///
/// Each trigger runs the job on its own task, so a run that outlasts the
/// interval makes the next trigger a logged no-op.
pub fn start_gmail_scheduler(job: Arc<GmailFetchJob>, schedule: Schedule) {
    tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Gmail cron schedule has no upcoming runs, scheduler stopped");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            info!(next_run = %next, "Next scheduled Gmail fetch");
            tokio::time::sleep(wait).await;

            let job = job.clone();
            tokio::spawn(async move {
                job.run().await;
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Datelike, Duration, Weekday};
    use spendmail_core::gmail::mock::sample_message;
    use spendmail_core::gmail::{FetchQuery, MailFetcher};
    use spendmail_core::models::RawEmailMessage;
    use spendmail_core::{DbCredentialStore, MerchantNormalizer, MockMailFetcher};
    use tokio::sync::Notify;

    fn alert(id: &str) -> RawEmailMessage {
        sample_message(
            id,
            "Transaction alert",
            "alerts@hdfcbank.net",
            "Rs.1,250.00 debited for UPI payment to SWIGGY on 12-05",
        )
    }

    fn connected_user(db: &Database, email: &str) -> i64 {
        let user = db.get_or_create_user(email).unwrap();
        db.save_gmail_token(
            user.id,
            "token",
            Some("refresh"),
            Utc::now() + Duration::hours(1),
        )
        .unwrap();
        user.id
    }

    fn job_with(db: &Database, fetcher: Arc<dyn MailFetcher>, concurrency: usize) -> GmailFetchJob {
        let orchestrator =
            SyncOrchestrator::new(db.clone(), fetcher, MerchantNormalizer::builtin());
        GmailFetchJob::new(
            db.clone(),
            orchestrator,
            Arc::new(DbCredentialStore::new(db.clone(), None).unwrap()),
            Arc::new(db.clone()),
            concurrency,
            SyncOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_credential_loss_deactivates_and_notifies_only_that_user() {
        let db = Database::in_memory().unwrap();
        let alice = connected_user(&db, "alice@example.com");
        let bob = connected_user(&db, "bob@example.com");

        let fetcher = Arc::new(MockMailFetcher::new());
        fetcher.fail_with_status(alice, 401, "Request had invalid authentication credentials");
        fetcher.set_messages(bob, vec![alert("m1")]);

        let job = job_with(&db, fetcher, 5);
        let summary = job.run().await.unwrap();

        assert_eq!(summary.users, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.deactivated, 1);
        assert_eq!(summary.saved, 1);

        let alice_notes = db.list_notifications(alice, false).unwrap();
        assert_eq!(alice_notes.len(), 1);
        assert!(!db.get_gmail_token(alice).unwrap().unwrap().is_active);

        assert!(db.list_notifications(bob, false).unwrap().is_empty());
        assert!(db.get_gmail_token(bob).unwrap().unwrap().is_active);
        assert_eq!(db.list_pending(bob).unwrap().len(), 1);

        // Deactivated users drop out of later runs
        assert_eq!(db.list_active_gmail_users().unwrap(), vec![bob]);
    }

    #[tokio::test]
    async fn test_other_errors_do_not_deactivate() {
        let db = Database::in_memory().unwrap();
        let alice = connected_user(&db, "alice@example.com");

        let fetcher = Arc::new(MockMailFetcher::new());
        fetcher.fail_with_status(alice, 503, "Backend Error");

        let summary = job_with(&db, fetcher, 5).run().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.deactivated, 0);
        assert!(db.get_gmail_token(alice).unwrap().unwrap().is_active);
        assert!(db.list_notifications(alice, false).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batches_cover_every_user() {
        let db = Database::in_memory().unwrap();
        let fetcher = Arc::new(MockMailFetcher::new());
        for i in 0..7 {
            let user = connected_user(&db, &format!("user{}@example.com", i));
            fetcher.set_messages(user, vec![alert(&format!("m{}", i))]);
        }

        let summary = job_with(&db, fetcher.clone(), 3).run().await.unwrap();
        assert_eq!(summary.users, 7);
        assert_eq!(summary.succeeded, 7);
        assert_eq!(fetcher.call_count(), 7);
    }

    /// Blocks every fetch until released
    struct GatedFetcher {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl MailFetcher for GatedFetcher {
        async fn fetch_messages(
            &self,
            _user_id: i64,
            _query: &FetchQuery,
        ) -> spendmail_core::Result<Vec<RawEmailMessage>> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_a_no_op() {
        let db = Database::in_memory().unwrap();
        connected_user(&db, "alice@example.com");

        let fetcher = Arc::new(GatedFetcher {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let job = Arc::new(job_with(&db, fetcher.clone(), 5));

        let first = tokio::spawn({
            let job = job.clone();
            async move { job.run().await }
        });
        fetcher.entered.notified().await;
        assert!(job.is_running());

        assert!(job.run().await.is_none());

        fetcher.release.notify_one();
        let summary = first.await.unwrap().unwrap();
        assert_eq!(summary.succeeded, 1);
        assert!(!job.is_running());

        // The guard is released, so the next trigger runs
        fetcher.release.notify_one();
        assert!(job.run().await.is_some());
    }

    #[test]
    fn test_parse_schedule() {
        let daily = parse_schedule("0 2 * * *").unwrap();
        let next = daily.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "02:00:00");

        assert!(parse_schedule("0 */15 * * * *").is_ok());
        assert!(parse_schedule("not a schedule").is_err());
    }

    fn next_weekdays(expr: &str, count: usize) -> Vec<Weekday> {
        parse_schedule(expr)
            .unwrap()
            .upcoming(Utc)
            .take(count)
            .map(|t| t.weekday())
            .collect()
    }

    #[test]
    fn test_crontab_weekday_numbering() {
        assert_eq!(next_weekdays("0 9 * * 1", 3), vec![Weekday::Mon; 3]);
        assert_eq!(next_weekdays("0 9 * * 0", 2), vec![Weekday::Sun; 2]);
        assert_eq!(next_weekdays("0 9 * * 7", 2), vec![Weekday::Sun; 2]);
        assert_eq!(next_weekdays("0 9 * * 6", 2), vec![Weekday::Sat; 2]);
        assert_eq!(next_weekdays("0 9 * * Mon", 2), vec![Weekday::Mon; 2]);

        let workdays = next_weekdays("0 9 * * 1-5", 10);
        assert!(workdays
            .iter()
            .all(|d| !matches!(d, Weekday::Sat | Weekday::Sun)));

        let mut weekend = next_weekdays("0 9 * * 5-7", 6);
        weekend.sort_by_key(|d| d.num_days_from_monday());
        weekend.dedup();
        assert_eq!(weekend, vec![Weekday::Fri, Weekday::Sat, Weekday::Sun]);

        let mut listed = next_weekdays("0 9 * * 0,3", 4);
        listed.sort_by_key(|d| d.num_days_from_monday());
        listed.dedup();
        assert_eq!(listed, vec![Weekday::Wed, Weekday::Sun]);

        assert!(parse_schedule("0 9 * * 8").is_err());
    }
}
