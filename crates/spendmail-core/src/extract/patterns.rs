//! Compiled regex table for transaction emails
//!
//! Patterns are compiled once on first use. Everything is case-insensitive;
//! the `regex` crate has no look-around, so neighbour checks that would need
//! it (glued digits, trailing dots) are done by the callers on match offsets.

use std::sync::OnceLock;

use regex::Regex;

/// Every pattern the extractor uses
#[derive(Debug)]
pub struct Patterns {
    // Rejection
    pub otp_body: Regex,
    pub otp_subject: Regex,
    pub failed: Regex,

    // Amounts
    pub amount: Regex,
    pub amount_keyword: Regex,

    // Direction
    pub subject_debit: Regex,
    pub subject_credit: Regex,
    pub recurring: Regex,
    pub wallet_transfer: Regex,
    pub wallet_credit: Regex,
    pub credit_keyword: Regex,
    pub debit_keyword: Regex,
    pub refund_phrase: Regex,
    pub loose_credit: Regex,
    pub loose_debit: Regex,

    // Vendor
    pub upi_payee: Regex,
    pub payment_to: Regex,
    pub preposition_vendor: Regex,
    pub sender_domain: Regex,

    // Metadata
    pub vpa: Regex,
    pub account_suffix: Regex,
    pub reference_id: Regex,

    // Body cleanup
    pub script_style: Regex,
    pub block_break: Regex,
    pub html_tag: Regex,
    pub numeric_entity: Regex,
}

/// Words that end a vendor phrase: dates, references, order numbers, currency
const VENDOR_STOP: &str = r"(?:on|dated|date|ref|refno|reference|order|txn|transaction|no|number|for|of|rs|inr|is|has|was|with|using|via|upi|at|from|avl|available|bal|balance|info|if|and)";

/// Characters allowed inside a vendor phrase
const VENDOR_CHARS: &str = r"[A-Za-z0-9&'\-_ ]";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in transaction pattern must compile")
}

impl Patterns {
    fn new() -> Self {
        let vendor_tail = format!(r"(?:\s+{}\b|\s+\d|\s*[.,;:()\[\]₹/@|!]|\s*$)", VENDOR_STOP);

        Self {
            otp_body: compile(
                r"(?i)\b(?:otp|one[\s-]?time[\s-]?password|verification\s+code|security\s+code)\b[^0-9]{0,30}\d{4,8}\b",
            ),
            otp_subject: compile(
                r"(?i)\b(?:otp|one[\s-]?time[\s-]?password|verification\s+code|security\s+code)\b",
            ),
            failed: compile(
                r"(?i)\b(?:failed|declined|unsuccessful|cancell?ed|could\s+not\s+be\s+processed)\b",
            ),

            amount: compile(
                r"(?i)((?:\brs\.?|\binr|₹)\s*)?(\d{1,3}(?:,\d{2,3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)",
            ),
            amount_keyword: compile(r"(?i)\b(?:total|net|amount|paid|debited|received)\b"),

            subject_debit: compile(r"(?i)\b(?:debited|payment)\b"),
            subject_credit: compile(r"(?i)\b(?:credited|refund|reversal)\b"),
            recurring: compile(
                r"(?i)\b(?:subscription\s+(?:renewal|renewed|charge[d]?|payment)|renewal\s+(?:charge|payment)|auto[\s-]?pay|auto[\s-]?debit|recurring\s+(?:payment|charge|debit|mandate)|e-?mandate|standing\s+instruction)\b",
            ),
            wallet_transfer: compile(
                r"(?i)\b(?:transferred|transfer|added|loaded|sent)\s+(?:to|from|into)\s+(?:your\s+)?(?:\w+\s+)?wallet\b|\bwallet\s+(?:transfer|top[\s-]?up|load(?:ed)?|recharge)\b",
            ),
            wallet_credit: compile(r"(?i)\btransferred\s+to\s+(?:your\s+)?(?:\w+\s+)?wallet\b"),
            credit_keyword: compile(
                r"(?i)\b(?:credited|received|refunded|refund|cashback|deposited|deposit)\b",
            ),
            debit_keyword: compile(
                r"(?i)\b(?:debited|paid|spent|withdrawn|withdrawal|purchase|sent|payment|charged|deducted)\b",
            ),
            refund_phrase: compile(r"(?i)\b(?:refund(?:ed)?|revers(?:al|ed))\b"),
            loose_credit: compile(r"(?i)\bcredited\s+(?:to|with)\b"),
            loose_debit: compile(r"(?i)\b(?:debited\s+from|paid\s+to)\b"),

            upi_payee: compile(&format!(
                r"(?i)\bupi\s+(?:payment|txn|transaction|transfer)?\s*(?:to|towards)\s+({chars}+?){tail}",
                chars = VENDOR_CHARS,
                tail = vendor_tail
            )),
            payment_to: compile(&format!(
                r"(?i)\b(?:payment\s+(?:made\s+)?(?:to|for)|paid\s+(?:to|for))\s+({chars}+?){tail}",
                chars = VENDOR_CHARS,
                tail = vendor_tail
            )),
            preposition_vendor: compile(&format!(
                r"(?i)\b(?:to|at|from|via|by)\s+([A-Za-z]{chars}{{1,40}}?){tail}",
                chars = VENDOR_CHARS,
                tail = vendor_tail
            )),
            sender_domain: compile(r"(?i)@([a-z0-9.\-]+\.[a-z]{2,})"),

            vpa: compile(r"(?i)\b([a-z0-9][a-z0-9._\-]{1,255}@[a-z]{2,64})\b"),
            account_suffix: compile(
                r"(?i)\b(?:a/c|acct|account|card)(?:\s*(?:no\.?|number|ending(?:\s+(?:in|with))?))?\s*[:.\-]?\s*(?:[x*]+|\.{2,})?\s*(\d{2,4})\b",
            ),
            reference_id: compile(
                r"(?i)\b(?:upi\s*ref(?:erence)?|ref(?:erence)?|rrn|txn|transaction)\s*(?:no\.?|number|id|#)?\s*[:.\-]?\s*(\d[A-Za-z0-9]{5,})\b",
            ),

            script_style: compile(r"(?is)<(?:script|style)\b[^>]*>.*?</(?:script|style)\s*>"),
            block_break: compile(r"(?i)<\s*(?:br|/p|/div|/tr|/td|/li|/h[1-6])\s*/?\s*>"),
            html_tag: compile(r"(?s)<[^>]*>"),
            numeric_entity: compile(r"&#(?:[xX]([0-9a-fA-F]{1,6})|(\d{1,7}));"),
        }
    }

    /// The shared, lazily compiled pattern table
    pub fn get() -> &'static Self {
        static INSTANCE: OnceLock<Patterns> = OnceLock::new();
        INSTANCE.get_or_init(Patterns::new)
    }
}
