//! Transaction extraction from bank and merchant emails
//!
//! Turns one raw Gmail message into a [`TransactionCandidate`], or `None` when
//! the email is not an actionable transaction (OTP, failed payment, no amount,
//! no direction). Everything here is a heuristic: the candidate carries a
//! coarse confidence instead of a guarantee.

pub mod body;
pub mod direction;
pub mod patterns;
pub mod vendor;

use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{
    round_amount, AmountSource, CandidateMetadata, Confidence, RawEmailMessage,
    TransactionCandidate, UNKNOWN_MERCHANT,
};
use patterns::Patterns;

pub use body::plain_text;
pub use direction::{detect_direction, DirectionMatch, DIRECTION_RULES};
pub use vendor::extract_vendor;

/// Bare integers longer than this are reference numbers, not amounts
const MAX_BARE_INTEGER_DIGITS: usize = 7;

/// An amount found in the text, with its offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountMatch {
    pub value: f64,
    /// Byte offset of the match, currency marker included
    pub start: usize,
    /// Whether a currency marker (Rs, INR, ₹) preceded the number
    pub prefixed: bool,
}

/// Extract a transaction candidate from one message
pub fn extract_transaction(message: &RawEmailMessage) -> Result<Option<TransactionCandidate>> {
    let text = plain_text(message)?;
    let subject = message.subject();
    let sender = message.sender();

    if let Some(reason) = rejection_reason(subject, &text) {
        debug!(message_id = %message.id, reason, "Email rejected");
        return Ok(None);
    }

    let amounts = find_amounts(&text);
    let Some((amount, amount_source)) = select_primary_amount(&text, &amounts) else {
        debug!(message_id = %message.id, "No amount found");
        return Ok(None);
    };

    let Some(direction) = detect_direction(subject, &text) else {
        debug!(message_id = %message.id, "No direction detected");
        return Ok(None);
    };

    let raw_vendor = extract_vendor(&text, subject, sender);
    let vpa = extract_vpa(&text);
    let account_last4 = capture(&Patterns::get().account_suffix, &text);
    let reference_id = capture(&Patterns::get().reference_id, &text);

    let score = confidence_score(
        amount_source,
        direction.confidence,
        vpa.is_some() || account_last4.is_some(),
        &raw_vendor,
    );

    Ok(Some(TransactionCandidate {
        message_id: message.id.clone(),
        amount,
        direction: direction.direction,
        raw_vendor,
        date: message.received_at(),
        metadata: CandidateMetadata {
            vpa,
            account_last4,
            reference_id,
            subject: subject.to_string(),
            sender: sender.to_string(),
            amount_source,
            direction_confidence: direction.confidence,
        },
        confidence: Confidence::from_score(score),
    }))
}

/// Extract candidates from many messages, skipping (and logging) failures
pub fn extract_batch(messages: &[RawEmailMessage]) -> Vec<TransactionCandidate> {
    messages
        .iter()
        .filter_map(|message| match extract_transaction(message) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Failed to extract transaction");
                None
            }
        })
        .collect()
}

fn rejection_reason(subject: &str, body: &str) -> Option<&'static str> {
    let p = Patterns::get();
    if p.otp_subject.is_match(subject) || p.otp_body.is_match(body) {
        Some("otp")
    } else if p.failed.is_match(body) {
        Some("failed")
    } else {
        None
    }
}

/// Parse an amount literal such as `1,250.00`, rounded to cents
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    round_amount(cleaned.parse().ok()?)
}

/// Every plausible amount in the text
///
/// Numbers glued to letters or date/time separators (`XX1234`, `12-05`,
/// `10:30`) and long bare integers are skipped. When any amount carries a
/// currency marker, only marked amounts are returned.
pub fn find_amounts(text: &str) -> Vec<AmountMatch> {
    let mut amounts = Vec::new();

    for caps in Patterns::get().amount.captures_iter(text) {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        let prefixed = caps.get(1).is_some();

        let before = text[..whole.start()].chars().next_back();

        if !prefixed && before.is_some_and(|c| c.is_alphanumeric() || "-/:._".contains(c)) {
            continue;
        }
        if !ends_cleanly(&text[number.end()..], prefixed) {
            continue;
        }

        let literal = number.as_str();
        if !prefixed && !literal.contains(['.', ',']) && literal.len() > MAX_BARE_INTEGER_DIGITS {
            continue;
        }

        if let Some(value) = parse_amount(literal) {
            amounts.push(AmountMatch {
                value,
                start: whole.start(),
                prefixed,
            });
        }
    }

    if amounts.iter().any(|a| a.prefixed) {
        amounts.retain(|a| a.prefixed);
    }
    amounts
}

/// Whether the text after an amount literal ends the number
///
/// Marked amounts may carry the `/-` or `-` suffix banks append
/// (`Rs.500/-`), as long as the suffix itself is followed by a boundary.
fn ends_cleanly(rest: &str, prefixed: bool) -> bool {
    let rest = if prefixed {
        rest.strip_prefix("/-")
            .or_else(|| rest.strip_prefix('-'))
            .filter(|tail| tail.chars().next().map_or(true, is_boundary))
            .unwrap_or(rest)
    } else {
        rest
    };

    let mut after = rest.chars();
    match after.next() {
        None => true,
        Some(c) if c.is_alphanumeric() || "-/:_".contains(c) => false,
        Some('.') => !after.next().is_some_and(|c| c.is_ascii_digit()),
        Some(_) => true,
    }
}

fn is_boundary(c: char) -> bool {
    c.is_whitespace() || (c.is_ascii_punctuation() && !"-/:_".contains(c))
}

/// Pick the transaction amount and record which rule chose it
pub fn select_primary_amount(text: &str, amounts: &[AmountMatch]) -> Option<(f64, AmountSource)> {
    match amounts {
        [] => None,
        [only] => Some((only.value, AmountSource::Single)),
        _ => {
            if let Some(keyword) = Patterns::get().amount_keyword.find(text) {
                let nearest = amounts
                    .iter()
                    .min_by_key(|a| a.start.abs_diff(keyword.start()))?;
                Some((nearest.value, AmountSource::KeywordProximity))
            } else {
                let largest = amounts
                    .iter()
                    .max_by(|a, b| a.value.total_cmp(&b.value))?;
                Some((largest.value, AmountSource::Largest))
            }
        }
    }
}

/// First UPI address that is not the start of an ordinary email address
fn extract_vpa(text: &str) -> Option<String> {
    Patterns::get().vpa.captures_iter(text).find_map(|caps| {
        let m = caps.get(1)?;
        let mut rest = text[m.end()..].chars();
        let is_email =
            rest.next() == Some('.') && rest.next().is_some_and(|c| c.is_ascii_alphanumeric());
        (!is_email).then(|| m.as_str().to_string())
    })
}

fn capture(pattern: &regex::Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Sum of the per-field scores; 70+ is high, 40+ medium
pub fn confidence_score(
    amount_source: AmountSource,
    direction_confidence: f64,
    has_account_marker: bool,
    raw_vendor: &str,
) -> u32 {
    let direction = if direction_confidence >= 0.8 {
        30
    } else if direction_confidence >= 0.5 {
        20
    } else {
        10
    };
    let marker = if has_account_marker { 15 } else { 0 };
    let vendor = if raw_vendor == UNKNOWN_MERCHANT { 5 } else { 25 };

    amount_source.score() + direction + marker + vendor
}
