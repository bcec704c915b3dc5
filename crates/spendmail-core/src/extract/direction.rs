//! Debit/credit direction detection
//!
//! An ordered table of rules, each a pure function over the subject and body.
//! The first rule that returns a match wins; if none does the email carries
//! no usable direction and is discarded.

use super::patterns::Patterns;
use crate::models::Direction;

/// Text a rule looks at
#[derive(Debug, Clone, Copy)]
pub struct DirectionInput<'a> {
    pub subject: &'a str,
    pub body: &'a str,
}

/// A detected direction with the confidence of the rule that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionMatch {
    pub direction: Direction,
    pub confidence: f64,
    pub rule: &'static str,
}

/// One step of the cascade
pub struct DirectionRule {
    pub name: &'static str,
    pub detect: fn(&DirectionInput<'_>) -> Option<(Direction, f64)>,
}

/// Rules in priority order
pub const DIRECTION_RULES: &[DirectionRule] = &[
    DirectionRule {
        name: "subject",
        detect: subject_rule,
    },
    DirectionRule {
        name: "recurring",
        detect: recurring_rule,
    },
    DirectionRule {
        name: "wallet_transfer",
        detect: wallet_rule,
    },
    DirectionRule {
        name: "keyword_score",
        detect: keyword_score_rule,
    },
    DirectionRule {
        name: "loose_fallback",
        detect: loose_fallback_rule,
    },
];

/// Run the cascade
pub fn detect_direction(subject: &str, body: &str) -> Option<DirectionMatch> {
    let input = DirectionInput { subject, body };
    DIRECTION_RULES.iter().find_map(|rule| {
        (rule.detect)(&input).map(|(direction, confidence)| DirectionMatch {
            direction,
            confidence,
            rule: rule.name,
        })
    })
}

fn subject_rule(input: &DirectionInput<'_>) -> Option<(Direction, f64)> {
    let p = Patterns::get();
    if p.subject_debit.is_match(input.subject) {
        Some((Direction::Debit, 0.9))
    } else if p.subject_credit.is_match(input.subject) {
        Some((Direction::Credit, 0.9))
    } else {
        None
    }
}

fn recurring_rule(input: &DirectionInput<'_>) -> Option<(Direction, f64)> {
    Patterns::get()
        .recurring
        .is_match(input.body)
        .then_some((Direction::Debit, 0.85))
}

fn wallet_rule(input: &DirectionInput<'_>) -> Option<(Direction, f64)> {
    let p = Patterns::get();
    if !p.wallet_transfer.is_match(input.body) {
        return None;
    }
    if p.wallet_credit.is_match(input.body) {
        Some((Direction::Credit, 0.8))
    } else {
        Some((Direction::Debit, 0.8))
    }
}

/// Credit keywords weigh 2, debit keywords 1, a refund/reversal phrase adds 5
/// to the credit side. A tie falls through.
fn keyword_score_rule(input: &DirectionInput<'_>) -> Option<(Direction, f64)> {
    let p = Patterns::get();

    let mut credit_score = 2 * p.credit_keyword.find_iter(input.body).count();
    let debit_score = p.debit_keyword.find_iter(input.body).count();

    if p.refund_phrase.is_match(input.body) {
        credit_score += 5;
    }

    let confidence = |score: usize| (score as f64 / 5.0).min(1.0);

    match credit_score.cmp(&debit_score) {
        std::cmp::Ordering::Greater => Some((Direction::Credit, confidence(credit_score))),
        std::cmp::Ordering::Less => Some((Direction::Debit, confidence(debit_score))),
        std::cmp::Ordering::Equal => None,
    }
}

fn loose_fallback_rule(input: &DirectionInput<'_>) -> Option<(Direction, f64)> {
    let p = Patterns::get();
    if p.loose_credit.is_match(input.body) {
        Some((Direction::Credit, 0.5))
    } else if p.loose_debit.is_match(input.body) {
        Some((Direction::Debit, 0.5))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(rule: &str, subject: &str, body: &str) -> Option<(Direction, f64)> {
        let rule = DIRECTION_RULES.iter().find(|r| r.name == rule).unwrap();
        (rule.detect)(&DirectionInput { subject, body })
    }

    #[test]
    fn test_subject_rule() {
        assert_eq!(
            run("subject", "Your a/c has been debited", ""),
            Some((Direction::Debit, 0.9))
        );
        assert_eq!(
            run("subject", "Payment successful", ""),
            Some((Direction::Debit, 0.9))
        );
        assert_eq!(
            run("subject", "Refund processed", ""),
            Some((Direction::Credit, 0.9))
        );
        assert_eq!(run("subject", "Account update", ""), None);
    }

    #[test]
    fn test_subject_beats_body_keywords() {
        let m = detect_direction(
            "Amount debited",
            "Refund credited. Cashback received. Amount credited to your account.",
        )
        .unwrap();
        assert_eq!(m.direction, Direction::Debit);
        assert_eq!(m.confidence, 0.9);
        assert_eq!(m.rule, "subject");
    }

    #[test]
    fn test_recurring_rule() {
        assert_eq!(
            run("recurring", "", "Your Netflix subscription renewal of Rs.649"),
            Some((Direction::Debit, 0.85))
        );
        assert_eq!(
            run("recurring", "", "AutoPay set up for electricity bill"),
            Some((Direction::Debit, 0.85))
        );
        assert_eq!(run("recurring", "", "Dinner at Toit"), None);
    }

    #[test]
    fn test_wallet_rule() {
        assert_eq!(
            run("wallet_transfer", "", "Rs.500 transferred to your Paytm wallet"),
            Some((Direction::Credit, 0.8))
        );
        assert_eq!(
            run("wallet_transfer", "", "Wallet top-up of Rs.500 from HDFC card"),
            Some((Direction::Debit, 0.8))
        );
        assert_eq!(run("wallet_transfer", "", "Paid to Swiggy"), None);
    }

    #[test]
    fn test_keyword_scoring() {
        // one credit keyword (2) beats one debit keyword (1)
        assert_eq!(
            run("keyword_score", "", "Rs.100 received, earlier paid"),
            Some((Direction::Credit, 0.4))
        );
        // refund bonus: refund (2) + credited (2) + 5 = 9 -> capped at 1.0
        assert_eq!(
            run("keyword_score", "", "refund credited for your order"),
            Some((Direction::Credit, 1.0))
        );
        assert_eq!(
            run("keyword_score", "", "Rs.100 spent, paid via card"),
            Some((Direction::Debit, 0.4))
        );
        // tie falls through
        assert_eq!(run("keyword_score", "", "credited after paid sent"), None);
        assert_eq!(run("keyword_score", "", "hello there"), None);
    }

    #[test]
    fn test_loose_fallback() {
        assert_eq!(
            run("loose_fallback", "", "credited to your account"),
            Some((Direction::Credit, 0.5))
        );
        assert_eq!(
            run("loose_fallback", "", "Rs.10 debited from account"),
            Some((Direction::Debit, 0.5))
        );
    }

    #[test]
    fn test_tie_reaches_loose_fallback() {
        // credited (2) vs debited + paid (2) ties; loose rule sees "credited to"
        let m = detect_direction("Alert", "credited to A, debited and paid").unwrap();
        assert_eq!(m.rule, "loose_fallback");
        assert_eq!(m.direction, Direction::Credit);
    }

    #[test]
    fn test_no_direction() {
        assert!(detect_direction("Hello", "Your statement is ready").is_none());
    }
}
