//! Raw vendor extraction
//!
//! Tries, in order: UPI payee, "payment to / paid to / paid for", a
//! preposition phrase ("to/at/from/via/by ..."), the sender's domain, and the
//! first meaningful words of the subject. The first result of at least three
//! characters wins; otherwise the vendor is [`UNKNOWN_MERCHANT`].

use regex::Regex;

use super::patterns::Patterns;
use crate::models::UNKNOWN_MERCHANT;

/// Maximum length of an extracted vendor string
const MAX_VENDOR_LEN: usize = 50;

/// Sender domains of merchants that email their own receipts
const SENDER_DOMAIN_MERCHANTS: &[(&str, &str)] = &[
    ("swiggy", "Swiggy"),
    ("zomato", "Zomato"),
    ("amazon", "Amazon"),
    ("flipkart", "Flipkart"),
    ("myntra", "Myntra"),
    ("uber", "Uber"),
    ("olacabs", "Ola"),
    ("rapido", "Rapido"),
    ("netflix", "Netflix"),
    ("spotify", "Spotify"),
    ("hotstar", "Disney+ Hotstar"),
    ("bigbasket", "BigBasket"),
    ("blinkit", "Blinkit"),
    ("zepto", "Zepto"),
    ("irctc", "IRCTC"),
    ("makemytrip", "MakeMyTrip"),
    ("bookmyshow", "BookMyShow"),
    ("airtel", "Airtel"),
    ("jio", "Jio"),
    ("paytm", "Paytm"),
    ("phonepe", "PhonePe"),
    ("google", "Google"),
    ("apple", "Apple"),
];

/// Words that never name a merchant on their own
const STOPWORDS: &[&str] = &[
    "a", "ac", "account", "alert", "an", "and", "at", "bank", "been", "by", "card", "credit",
    "credited", "debit", "debited", "dear", "for", "from", "has", "have", "in", "info",
    "information", "inr", "is", "made", "notification", "of", "on", "order", "payment", "receipt",
    "rs", "successful", "the", "to", "transaction", "txn", "update", "upi", "via", "was", "with",
    "you", "your",
];

/// Leading words that mean a preposition phrase points at the user, not a merchant
const SELF_REFERENCES: &[&str] = &["your", "you", "a/c", "ac", "account", "card", "us", "the account"];

/// Leading words of links in footers ("Cancel anytime at www.x.com")
const WEB_FRAGMENTS: &[&str] = &["www", "http", "https", "ftp"];

/// Find the raw vendor for an email
pub fn extract_vendor(body: &str, subject: &str, sender: &str) -> String {
    let p = Patterns::get();

    let from_body = first_capture(&p.upi_payee, body)
        .or_else(|| first_capture(&p.payment_to, body))
        .or_else(|| first_capture(&p.preposition_vendor, body));

    from_body
        .or_else(|| vendor_from_sender(sender))
        .or_else(|| vendor_from_subject(subject))
        .unwrap_or_else(|| UNKNOWN_MERCHANT.to_string())
}

/// First capture of a vendor pattern that survives cleanup
fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| clean_vendor(m.as_str()))
        .next()
}

/// Trim, collapse and validate a candidate vendor string
fn clean_vendor(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| !c.is_alphanumeric() && c != '&');
    let trimmed = trimmed
        .strip_prefix("VPA ")
        .or_else(|| trimmed.strip_prefix("vpa "))
        .unwrap_or(trimmed);

    let lower = trimmed.to_lowercase();
    if SELF_REFERENCES
        .iter()
        .any(|s| lower == *s || lower.starts_with(&format!("{} ", s)))
    {
        return None;
    }
    if lower
        .split_whitespace()
        .next()
        .is_some_and(|word| WEB_FRAGMENTS.contains(&word) || word.starts_with("www."))
    {
        return None;
    }

    let vendor: String = trimmed.chars().take(MAX_VENDOR_LEN).collect();
    let vendor = vendor.trim().to_string();
    (vendor.chars().count() >= 3).then_some(vendor)
}

/// Merchant implied by the sender address, e.g. `noreply@swiggy.in`
fn vendor_from_sender(sender: &str) -> Option<String> {
    let caps = Patterns::get().sender_domain.captures(sender)?;
    let domain = caps.get(1)?.as_str().to_lowercase();

    SENDER_DOMAIN_MERCHANTS
        .iter()
        .find(|(key, _)| domain.split('.').any(|label| label == *key))
        .map(|(_, merchant)| merchant.to_string())
}

/// First one to three meaningful words of the subject
fn vendor_from_subject(subject: &str) -> Option<String> {
    let words: Vec<&str> = subject
        .split(|c: char| !c.is_alphanumeric() && c != '&' && c != '\'')
        .filter(|w| !w.is_empty())
        .filter(|w| w.chars().any(|c| c.is_alphabetic()))
        .filter(|w| !w.chars().any(|c| c.is_ascii_digit()))
        .filter(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .take(3)
        .collect();

    if words.is_empty() {
        return None;
    }
    clean_vendor(&words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upi_payee() {
        assert_eq!(
            extract_vendor(
                "Rs.1,250.00 debited for UPI payment to SWIGGY on 12-05",
                "",
                ""
            ),
            "SWIGGY"
        );
        assert_eq!(
            extract_vendor(
                "UPI txn to BHARAT PETROLEUM CORP. Ref 412345678901",
                "",
                ""
            ),
            "BHARAT PETROLEUM CORP"
        );
    }

    #[test]
    fn test_payment_to() {
        assert_eq!(
            extract_vendor("You have paid to Blue Tokai Coffee using card", "", ""),
            "Blue Tokai Coffee"
        );
        assert_eq!(
            extract_vendor("Payment for Airtel Postpaid of Rs 499 received", "", ""),
            "Airtel Postpaid"
        );
    }

    #[test]
    fn test_preposition_vendor_skips_self_references() {
        assert_eq!(
            extract_vendor(
                "Rs 320 spent on your card at Starbucks Coffee on 2024-05-01",
                "",
                ""
            ),
            "Starbucks Coffee"
        );
        assert_eq!(
            extract_vendor("Rs 100 debited from your account", "", ""),
            UNKNOWN_MERCHANT
        );
    }

    #[test]
    fn test_links_are_not_vendors() {
        assert_eq!(
            extract_vendor("Rs 199 charged. Cancel anytime at www.x.com", "", ""),
            UNKNOWN_MERCHANT
        );
        assert_eq!(
            extract_vendor("Manage it at https://x.com/account", "", ""),
            UNKNOWN_MERCHANT
        );
        assert_eq!(
            extract_vendor("Rs 99 paid at Chai Point. Details at www.x.com", "", ""),
            "Chai Point"
        );
        assert_eq!(clean_vendor("www"), None);
    }

    #[test]
    fn test_sender_domain_fallback() {
        assert_eq!(
            extract_vendor(
                "Your order total is Rs 450",
                "Order delivered",
                "Swiggy <noreply@swiggy.in>"
            ),
            "Swiggy"
        );
    }

    #[test]
    fn test_subject_fallback() {
        assert_eq!(
            extract_vendor(
                "Rs 450 charged",
                "Your Cult.fit membership receipt",
                "billing@example.com"
            ),
            "Cult fit membership"
        );
    }

    #[test]
    fn test_unknown_merchant() {
        assert_eq!(extract_vendor("Rs 450", "Transaction alert", ""), UNKNOWN_MERCHANT);
    }

    #[test]
    fn test_clean_vendor_length_rule() {
        assert_eq!(clean_vendor("  ab "), None);
        assert_eq!(clean_vendor("Swiggy."), Some("Swiggy".to_string()));
        assert_eq!(clean_vendor("your account"), None);
        assert_eq!(clean_vendor("VPA swiggy"), Some("swiggy".to_string()));
    }
}
