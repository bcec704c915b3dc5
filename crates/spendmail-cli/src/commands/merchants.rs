//! Merchant dictionary commands

use std::sync::Arc;

use anyhow::Result;
use spendmail_core::db::Database;
use spendmail_core::MerchantNormalizer;

pub fn cmd_merchants_list(db: &Database) -> Result<()> {
    let aliases = db.list_merchant_aliases()?;

    if aliases.is_empty() {
        println!("No custom merchants. The built-in dictionary is always used.");
        println!("Add one with: spendmail merchants add <alias> <canonical>");
        return Ok(());
    }

    println!();
    println!("🏪 Custom Merchants");
    println!("   ─────────────────────────────────────────────────────────────");
    for entry in aliases {
        println!("   {:<24} → {}", entry.alias, entry.canonical);
    }

    Ok(())
}

pub fn cmd_merchants_add(db: &Database, alias: &str, canonical: &str) -> Result<()> {
    db.upsert_merchant_alias(alias, canonical)?;
    db.log_audit(
        "cli",
        "add_merchant",
        Some("merchant_alias"),
        None,
        Some(&format!("{} -> {}", alias.trim(), canonical.trim())),
    )?;

    println!("✅ '{}' now normalizes to {}", alias.trim().to_lowercase(), canonical.trim());
    Ok(())
}

pub fn cmd_merchants_test(db: &Database, raw: &str) -> Result<()> {
    let normalizer = MerchantNormalizer::new(Arc::new(db.clone()));
    let result = normalizer.normalize(raw);
    println!("{} → {} ({})", raw, result.vendor, result.confidence.as_str());
    Ok(())
}
