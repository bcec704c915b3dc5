//! Domain models for spendmail

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder vendor used when no merchant could be extracted from an email
pub const UNKNOWN_MERCHANT: &str = "Unknown Merchant";

/// Category assigned to staged transactions until the user edits them
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Tag marking ledger entries that were imported from Gmail
pub const GMAIL_TAG: &str = "gmail-import";

/// Payment method recorded on expenses created from emails
pub const DEFAULT_PAYMENT_METHOD: &str = "UPI";

// ============================================================================
// Enumerations
// ============================================================================

/// Whether money left the account (debit) or arrived (credit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debit" => Ok(Self::Debit),
            "credit" => Ok(Self::Credit),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse three-level estimate of extraction correctness
///
/// Ordered `Low < Medium < High` so that combining two confidences is `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Bucket a 0-100 extraction score
    pub fn from_score(score: u32) -> Self {
        if score >= 70 {
            Self::High
        } else if score >= 40 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Worst of two confidences: any low makes low, else any medium makes medium
    pub fn combine(self, other: Self) -> Self {
        self.min(other)
    }
}

impl std::str::FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown confidence: {}", s)),
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which rule chose the primary amount of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountSource {
    /// Only one amount appeared in the text
    Single,
    /// Closest amount to a total/paid/debited keyword
    KeywordProximity,
    /// No keyword present, largest value taken
    Largest,
}

impl AmountSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::KeywordProximity => "keyword_proximity",
            Self::Largest => "largest",
        }
    }

    /// Score contribution toward the overall candidate confidence
    pub fn score(&self) -> u32 {
        match self {
            Self::Single => 30,
            Self::KeywordProximity => 20,
            Self::Largest => 10,
        }
    }
}

/// Kinds of user-facing notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// Gmail access was lost and the user must reconnect
    GmailReconnect,
    /// Informational sync summary
    GmailSync,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GmailReconnect => "gmail_reconnect",
            Self::GmailSync => "gmail_sync",
        }
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "gmail_reconnect" => Ok(Self::GmailReconnect),
            "gmail_sync" => Ok(Self::GmailSync),
            _ => Err(format!("Unknown notification type: {}", s)),
        }
    }
}

// ============================================================================
// Raw email (Gmail API message resource)
// ============================================================================

/// A single message header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Transfer-encoded body of a MIME part
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub size: u64,
    /// base64url-encoded payload
    #[serde(default)]
    pub data: Option<String>,
}

/// A MIME part, either a leaf with a body or a container of sub-parts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: MessageBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl MessagePart {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// A fetched email as returned by the mail provider (read-only input)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Provider-supplied plain text preview
    #[serde(default)]
    pub snippet: Option<String>,
    /// Receipt time in milliseconds since the epoch (Gmail sends it as a string)
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: MessagePart,
}

impl RawEmailMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload.header(name)
    }

    pub fn subject(&self) -> &str {
        self.header("Subject").unwrap_or_default()
    }

    pub fn sender(&self) -> &str {
        self.header("From").unwrap_or_default()
    }

    /// When the provider received the message
    ///
    /// Uses `internalDate`, then the `Date` header, then the current time.
    pub fn received_at(&self) -> DateTime<Utc> {
        if let Some(ms) = self
            .internal_date
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
        {
            if let chrono::LocalResult::Single(dt) = Utc.timestamp_millis_opt(ms) {
                return dt;
            }
        }

        self.header("Date")
            .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now)
    }
}

// ============================================================================
// Extraction output
// ============================================================================

/// Auxiliary facts pulled out of an email alongside the transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    /// UPI virtual payment address, e.g. `merchant@okaxis`
    pub vpa: Option<String>,
    /// Trailing account digits following an account marker
    pub account_last4: Option<String>,
    /// UPI / transaction reference number
    pub reference_id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub amount_source: AmountSource,
    /// Confidence of the direction rule that fired (0.0 - 1.0)
    pub direction_confidence: f64,
}

/// A parsed, not yet persisted, transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCandidate {
    pub message_id: String,
    /// Always positive, rounded to cents
    pub amount: f64,
    pub direction: Direction,
    /// Vendor string as found in the text, before normalization
    pub raw_vendor: String,
    pub date: DateTime<Utc>,
    pub metadata: CandidateMetadata,
    pub confidence: Confidence,
}

/// Result of merchant normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedVendor {
    pub vendor: String,
    pub confidence: Confidence,
}

// ============================================================================
// Persistent records
// ============================================================================

/// A staged transaction awaiting user review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: i64,
    pub user_id: i64,
    pub source_message_id: String,
    pub amount: f64,
    pub direction: Direction,
    pub vendor: String,
    pub raw_vendor: String,
    pub date: DateTime<Utc>,
    pub reference_id: Option<String>,
    pub confidence: Confidence,
    pub metadata: serde_json::Value,
    pub category: String,
    pub description: String,
    pub is_confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to stage a new pending transaction
#[derive(Debug, Clone)]
pub struct NewPendingTransaction {
    pub user_id: i64,
    pub source_message_id: String,
    pub amount: f64,
    pub direction: Direction,
    pub vendor: String,
    pub raw_vendor: String,
    pub date: DateTime<Utc>,
    pub reference_id: Option<String>,
    pub confidence: Confidence,
    pub metadata: serde_json::Value,
}

/// User edits to a pending transaction (all fields optional)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub amount: Option<f64>,
    pub date: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

/// Round a money amount to cents; `None` unless the result is positive
pub fn round_amount(value: f64) -> Option<f64> {
    let rounded = (value * 100.0).round() / 100.0;
    (rounded.is_finite() && rounded > 0.0).then_some(rounded)
}

impl PendingUpdate {
    pub fn is_empty(&self) -> bool {
        self.vendor.is_none()
            && self.category.is_none()
            && self.amount.is_none()
            && self.date.is_none()
            && self.description.is_none()
    }
}

/// A ledger expense
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub user_id: i64,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub date: DateTime<Utc>,
    pub payment_method: String,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub source_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create an expense
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub user_id: i64,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub date: DateTime<Utc>,
    pub payment_method: String,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub source_message_id: Option<String>,
}

impl NewExpense {
    /// Build a Gmail-sourced expense
    ///
    /// An empty description falls back to "`vendor` transaction"; the notes
    /// embed the reference id (or the message id when there is none).
    #[allow(clippy::too_many_arguments)]
    pub fn from_email(
        user_id: i64,
        vendor: &str,
        description: &str,
        category: &str,
        amount: f64,
        date: DateTime<Utc>,
        reference_id: Option<&str>,
        source_message_id: &str,
    ) -> Self {
        let description = if description.trim().is_empty() {
            format!("{} transaction", vendor)
        } else {
            description.trim().to_string()
        };

        let notes = format!(
            "Imported from Gmail. Ref: {}",
            reference_id.unwrap_or(source_message_id)
        );

        Self {
            user_id,
            description,
            amount,
            category: category.to_string(),
            date,
            payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
            tags: vec![GMAIL_TAG.to_string()],
            notes: Some(notes),
            source_message_id: Some(source_message_id.to_string()),
        }
    }
}

/// Outcome of staging one candidate
#[derive(Debug, Clone)]
pub enum StagedRecord {
    /// Staged for review
    Pending(PendingTransaction),
    /// Written straight to the ledger (auto-confirm mode)
    Expense(Expense),
}

/// An application user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub is_admin: bool,
    pub last_auto_sync_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Stored Gmail OAuth credential
#[derive(Debug, Clone)]
pub struct GmailToken {
    pub user_id: i64,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl GmailToken {
    /// Whether the access token should be refreshed before use (60s skew)
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + chrono::Duration::seconds(60)
    }
}

/// Gmail connection status shown to the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub last_fetch_at: Option<DateTime<Utc>>,
}

/// A stored notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification to create
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
}

impl NewNotification {
    /// Prompt the user to reconnect Gmail after credential loss
    pub fn gmail_reconnect(user_id: i64) -> Self {
        Self {
            user_id,
            notification_type: NotificationType::GmailReconnect,
            title: "Reconnect Gmail".to_string(),
            message: "Your Gmail access has expired or was revoked. Reconnect to keep \
                      importing transactions from your bank emails."
                .to_string(),
            action_url: Some("/settings/gmail".to_string()),
        }
    }
}

// ============================================================================
// Sync and confirmation results
// ============================================================================

/// Options for one sync run
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SyncOptions {
    pub max_results: u32,
    pub window_days: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_results: 50,
            window_days: 30,
        }
    }
}

/// A per-message failure recorded during a sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncError {
    pub id: String,
    pub error: String,
}

/// Counters for one sync run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub fetched: usize,
    pub parsed: usize,
    pub saved: usize,
    pub skipped: usize,
    pub errors: Vec<SyncError>,
}

/// Counts from a confirmation batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmResult {
    pub confirmed: usize,
    pub expenses_created: usize,
}
