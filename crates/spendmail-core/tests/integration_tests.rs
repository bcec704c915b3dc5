//! Integration tests for spendmail-core
//!
//! These tests exercise the full fetch → extract → normalize → stage → confirm
//! workflow against a temporary database.

use std::sync::Arc;

use chrono::Utc;
use spendmail_core::{
    confirm_transactions,
    db::Database,
    extract_transaction,
    gmail::mock::{sample_html_message, sample_message},
    models::{Confidence, Direction, RawEmailMessage, SyncOptions},
    test_utils::MockGmailServer,
    CredentialStore, DbCredentialStore, GmailClient, MerchantNormalizer, MockMailFetcher,
    SyncOrchestrator,
};

fn swiggy_alert(id: &str) -> RawEmailMessage {
    sample_message(
        id,
        "Transaction alert for your HDFC Bank account",
        "HDFC Bank InstaAlerts <alerts@hdfcbank.net>",
        "Dear Customer, Rs.1,250.00 debited for UPI payment to SWIGGY on 12-05",
    )
}

fn otp_mail(id: &str) -> RawEmailMessage {
    sample_message(
        id,
        "OTP for your transaction",
        "alerts@hdfcbank.net",
        "Your OTP is 482913 for the transaction of Rs.2,000.00 at Amazon. Valid for 10 minutes.",
    )
}

fn setup() -> (Database, Arc<MockMailFetcher>, SyncOrchestrator, i64) {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let user = db.get_or_create_user("alice@example.com").unwrap();
    let fetcher = Arc::new(MockMailFetcher::new());
    let orchestrator = SyncOrchestrator::new(db.clone(), fetcher.clone(), MerchantNormalizer::builtin());
    (db, fetcher, orchestrator, user.id)
}

// =============================================================================
// Extraction + Normalization
// =============================================================================

#[test]
fn test_upi_debit_alert_is_normalized() {
    let candidate = extract_transaction(&swiggy_alert("m1")).unwrap().unwrap();
    assert_eq!(candidate.amount, 1250.00);
    assert_eq!(candidate.direction, Direction::Debit);
    assert_eq!(candidate.raw_vendor, "SWIGGY");

    let vendor = MerchantNormalizer::builtin().normalize(&candidate.raw_vendor);
    assert_eq!(vendor.vendor, "Swiggy");
    assert_eq!(vendor.confidence, Confidence::High);
}

#[test]
fn test_html_only_alert() {
    let msg = sample_html_message(
        "m-html",
        "You have made a payment",
        "no-reply@paytm.com",
        "<html><body><p>Paid&nbsp;<b>&#8377;2,500.00</b> to Zomato</p>\
         <style>.x{color:red}</style><p>UPI Ref No. 412345678901</p></body></html>",
    );

    let candidate = extract_transaction(&msg).unwrap().unwrap();
    assert_eq!(candidate.amount, 2500.00);
    assert_eq!(candidate.direction, Direction::Debit);
    assert_eq!(
        candidate.metadata.reference_id.as_deref(),
        Some("412345678901")
    );
}

// =============================================================================
// Sync pipeline
// =============================================================================

#[tokio::test]
async fn test_otp_is_fetched_but_not_parsed() {
    let (db, fetcher, orchestrator, user_id) = setup();
    fetcher.set_messages(user_id, vec![otp_mail("m-otp")]);

    let stats = orchestrator
        .sync_user(user_id, SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.fetched, 1);
    assert_eq!(stats.parsed, 0);
    assert_eq!(stats.saved, 0);
    assert!(db.list_pending(user_id).unwrap().is_empty());
}

#[tokio::test]
async fn test_repeat_sync_is_idempotent() {
    let (db, fetcher, orchestrator, user_id) = setup();
    fetcher.set_messages(user_id, vec![swiggy_alert("m1")]);

    let first = orchestrator
        .sync_user(user_id, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(first.saved, 1);
    assert_eq!(first.skipped, 0);

    let second = orchestrator
        .sync_user(user_id, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(second.saved, 0);
    assert_eq!(second.skipped, 1);

    assert_eq!(db.list_pending(user_id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_overlapping_syncs_stage_once() {
    let (db, fetcher, orchestrator, user_id) = setup();
    fetcher.set_messages(user_id, vec![swiggy_alert("m1"), swiggy_alert("m2")]);

    let (a, b) = tokio::join!(
        orchestrator.sync_user(user_id, SyncOptions::default()),
        orchestrator.sync_user(user_id, SyncOptions::default())
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.saved + b.saved, 2);
    assert_eq!(db.list_pending(user_id).unwrap().len(), 2);
}

#[tokio::test]
async fn test_confirm_debit_and_credit() {
    let (db, fetcher, orchestrator, user_id) = setup();
    fetcher.set_messages(
        user_id,
        vec![
            sample_message(
                "m-netflix",
                "Payment successful",
                "alerts@hdfcbank.net",
                "Rs.499.00 paid to NETFLIX via UPI. UPI Ref No. 312345678901",
            ),
            sample_message(
                "m-salary",
                "Amount credited",
                "alerts@hdfcbank.net",
                "INR 45,000.00 credited to your account XX1234 from ACME PAYROLL",
            ),
        ],
    );
    orchestrator
        .sync_user(user_id, SyncOptions::default())
        .await
        .unwrap();

    let pending = db.list_pending(user_id).unwrap();
    assert_eq!(pending.len(), 2);
    let ids: Vec<i64> = pending.iter().map(|p| p.id).collect();

    let result = confirm_transactions(&db, user_id, &ids).unwrap();
    assert_eq!(result.confirmed, 2);
    assert_eq!(result.expenses_created, 1);

    let expenses = db.list_expenses(user_id, 10).unwrap();
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].amount, 499.0);
    assert_eq!(expenses[0].source_message_id.as_deref(), Some("m-netflix"));
    assert!(db.list_pending(user_id).unwrap().is_empty());

    // Confirming the same ids again changes nothing
    let again = confirm_transactions(&db, user_id, &ids).unwrap();
    assert_eq!(again.confirmed, 0);
    assert_eq!(db.list_expenses(user_id, 10).unwrap().len(), 1);
}

// =============================================================================
// Gmail REST client against the mock API
// =============================================================================

#[tokio::test]
async fn test_sync_through_gmail_client() {
    let server = MockGmailServer::start(vec![swiggy_alert("g1"), otp_mail("g2")]).await;
    let db = Database::in_memory().unwrap();
    let user = db.get_or_create_user("alice@example.com").unwrap();
    db.save_gmail_token(
        user.id,
        MockGmailServer::VALID_TOKEN,
        Some("refresh"),
        Utc::now() + chrono::Duration::hours(1),
    )
    .unwrap();

    let store: Arc<dyn CredentialStore> =
        Arc::new(DbCredentialStore::new(db.clone(), None).unwrap());
    let client = Arc::new(GmailClient::new(&server.url(), store.clone()).unwrap());
    let orchestrator = SyncOrchestrator::new(db.clone(), client, MerchantNormalizer::builtin());

    let stats = orchestrator
        .sync_user(user.id, SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(stats.fetched, 2);
    assert_eq!(stats.saved, 1);

    assert!(server.last_query().unwrap().contains("newer_than:30d"));
    let status = store.connection_status(user.id).await.unwrap();
    assert!(status.connected);
    assert!(status.last_fetch_at.is_some());
}

#[tokio::test]
async fn test_rejected_credential_surfaces_as_credential_error() {
    let server = MockGmailServer::start(vec![swiggy_alert("g1")]).await;
    let db = Database::in_memory().unwrap();
    let user = db.get_or_create_user("alice@example.com").unwrap();
    db.save_gmail_token(
        user.id,
        "revoked-token",
        Some("refresh"),
        Utc::now() + chrono::Duration::hours(1),
    )
    .unwrap();

    let store: Arc<dyn CredentialStore> =
        Arc::new(DbCredentialStore::new(db.clone(), None).unwrap());
    let client = Arc::new(GmailClient::new(&server.url(), store).unwrap());
    let orchestrator = SyncOrchestrator::new(db.clone(), client, MerchantNormalizer::builtin());

    let err = orchestrator
        .sync_user(user.id, SyncOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_credential_error());
    assert!(db.list_pending(user.id).unwrap().is_empty());
    assert!(db.get_user(user.id).unwrap().unwrap().last_sync_error.is_some());
}
