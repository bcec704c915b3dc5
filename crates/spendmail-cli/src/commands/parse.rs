//! Offline extraction from a saved Gmail message

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use spendmail_core::models::RawEmailMessage;
use spendmail_core::{extract_transaction, MerchantNormalizer};

/// Extract and normalize a transaction from a Gmail API message resource
///
/// Returns `None` when the message is not a usable transaction alert.
pub fn parse_message(raw_json: &str) -> Result<Option<serde_json::Value>> {
    let message: RawEmailMessage =
        serde_json::from_str(raw_json).context("Not a Gmail message resource")?;

    let Some(candidate) = extract_transaction(&message)? else {
        return Ok(None);
    };

    let normalized = MerchantNormalizer::builtin().normalize(&candidate.raw_vendor);
    let confidence = candidate.confidence.combine(normalized.confidence);

    Ok(Some(json!({
        "candidate": candidate,
        "vendor": normalized.vendor,
        "vendor_confidence": normalized.confidence,
        "confidence": confidence,
    })))
}

pub fn cmd_parse(file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    match parse_message(&raw)? {
        Some(parsed) => println!("{}", serde_json::to_string_pretty(&parsed)?),
        None => {
            println!("No transaction found (OTP, failed transaction, or no amount/direction)")
        }
    }

    Ok(())
}
