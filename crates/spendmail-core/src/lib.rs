//! Spendmail Core Library
//!
//! Turns bank and payment-app emails into reviewable transactions:
//! - Gmail collaborators (REST client, credential store with token refresh)
//! - Transaction text extraction (amount, direction, vendor, metadata)
//! - Merchant normalization against a runtime-extensible dictionary
//! - Deduplicating staging into pending transactions or the expense ledger
//! - Per-user sync orchestration and the confirmation workflow
//! - SQLite storage, optionally encrypted with SQLCipher

pub mod config;
pub mod confirm;
pub mod db;
pub mod error;
pub mod extract;
pub mod gmail;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod staging;
pub mod sync;

/// Test utilities including a mock Gmail API server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{GmailConfig, OAuthClientConfig};
pub use confirm::confirm_transactions;
pub use db::{AuditEntry, Database};
pub use error::{Error, Result};
pub use extract::{extract_batch, extract_transaction};
pub use gmail::{CredentialStore, DbCredentialStore, FetchQuery, GmailClient, MailFetcher};
pub use normalize::{BuiltinDictionary, MerchantDictionary, MerchantEntry, MerchantNormalizer};
pub use notify::NotificationSink;
pub use staging::{stage_candidate, StagingMode};
pub use sync::{build_relevance_query, SyncOrchestrator};

#[cfg(any(test, feature = "test-utils"))]
pub use gmail::MockMailFetcher;
