//! Runtime merchant aliases
//!
//! The database is itself a [`MerchantDictionary`]: stored aliases are looked
//! up first, then the built-in table.

use rusqlite::params;

use super::Database;
use crate::error::Result;
use crate::normalize::{validate_entry, BuiltinDictionary, MerchantDictionary, MerchantEntry};

impl Database {
    /// Add or replace an alias
    pub fn upsert_merchant_alias(&self, alias: &str, canonical_name: &str) -> Result<()> {
        let entry = validate_entry(alias, canonical_name)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO merchant_aliases (alias, canonical_name) VALUES (?, ?)
            ON CONFLICT(alias) DO UPDATE SET canonical_name = excluded.canonical_name
            "#,
            params![entry.alias, entry.canonical],
        )?;
        Ok(())
    }

    /// Stored aliases, most recently added first
    pub fn list_merchant_aliases(&self) -> Result<Vec<MerchantEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT alias, canonical_name FROM merchant_aliases ORDER BY id DESC")?;
        let entries = stmt
            .query_map([], |row| {
                Ok(MerchantEntry {
                    alias: row.get(0)?,
                    canonical: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

impl MerchantDictionary for Database {
    fn entries(&self) -> Result<Vec<MerchantEntry>> {
        let mut entries = self.list_merchant_aliases()?;
        entries.extend(BuiltinDictionary::seeded());
        Ok(entries)
    }

    fn add(&self, alias: &str, canonical: &str) -> Result<()> {
        self.upsert_merchant_alias(alias, canonical)
    }
}
