//! Merchant normalization
//!
//! Maps a raw vendor string to a canonical merchant name:
//! 1. Dictionary lookup: the first alias contained in the lowercased input wins (high)
//! 2. Bigram similarity against the canonical names (>= 0.7 high, >= 0.5 medium)
//! 3. Otherwise the input is echoed back title-cased (low)
//!
//! The dictionary is injected through [`MerchantDictionary`] so that runtime
//! additions can live wherever the caller keeps them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{Confidence, NormalizedVendor};

/// Returned for empty input
pub const UNKNOWN_VENDOR: &str = "Unknown";

const HIGH_SIMILARITY: f64 = 0.7;
const MEDIUM_SIMILARITY: f64 = 0.5;

/// Built-in short forms, checked in order (longer aliases before their prefixes)
const BUILTIN_MERCHANTS: &[(&str, &str)] = &[
    ("swiggy instamart", "Swiggy Instamart"),
    ("instamart", "Swiggy Instamart"),
    ("swiggy", "Swiggy"),
    ("zomato", "Zomato"),
    ("blinkit", "Blinkit"),
    ("grofers", "Blinkit"),
    ("zepto", "Zepto"),
    ("bigbasket", "BigBasket"),
    ("big basket", "BigBasket"),
    ("amazon pay", "Amazon Pay"),
    ("amazon", "Amazon"),
    ("amzn", "Amazon"),
    ("flipkart", "Flipkart"),
    ("myntra", "Myntra"),
    ("ajio", "Ajio"),
    ("nykaa", "Nykaa"),
    ("uber eats", "Uber Eats"),
    ("uber", "Uber"),
    ("olacabs", "Ola"),
    ("ola cabs", "Ola"),
    ("ani technologies", "Ola"),
    ("rapido", "Rapido"),
    ("irctc", "IRCTC"),
    ("makemytrip", "MakeMyTrip"),
    ("goibibo", "Goibibo"),
    ("indigo", "IndiGo"),
    ("bookmyshow", "BookMyShow"),
    ("netflix", "Netflix"),
    ("spotify", "Spotify"),
    ("hotstar", "Disney+ Hotstar"),
    ("youtube", "YouTube Premium"),
    ("google play", "Google Play"),
    ("apple.com", "Apple"),
    ("airtel", "Airtel"),
    ("reliance jio", "Jio"),
    ("jio", "Jio"),
    ("vodafone", "Vi"),
    ("bescom", "BESCOM"),
    ("tata power", "Tata Power"),
    ("bharat petroleum", "Bharat Petroleum"),
    ("bpcl", "Bharat Petroleum"),
    ("indian oil", "Indian Oil"),
    ("iocl", "Indian Oil"),
    ("hpcl", "HP Petrol"),
    ("dmart", "DMart"),
    ("avenue supermarts", "DMart"),
    ("reliance retail", "Reliance Retail"),
    ("starbucks", "Starbucks"),
    ("dominos", "Domino's"),
    ("domino's", "Domino's"),
    ("mcdonald", "McDonald's"),
    ("cult.fit", "Cult.fit"),
    ("cultfit", "Cult.fit"),
    ("paytm", "Paytm"),
    ("phonepe", "PhonePe"),
    ("cred club", "CRED"),
    ("dreamplug", "CRED"),
];

/// One alias -> canonical name mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantEntry {
    /// Lowercase short form matched as a substring
    pub alias: String,
    pub canonical: String,
}

impl MerchantEntry {
    pub fn new(alias: &str, canonical: &str) -> Self {
        Self {
            alias: alias.trim().to_lowercase(),
            canonical: canonical.trim().to_string(),
        }
    }
}

/// Source of alias mappings for the normalizer
pub trait MerchantDictionary: Send + Sync {
    /// All entries in lookup order
    fn entries(&self) -> Result<Vec<MerchantEntry>>;

    /// Add (or replace) an alias at runtime
    fn add(&self, alias: &str, canonical: &str) -> Result<()>;
}

/// In-memory dictionary seeded with common merchants
///
/// Runtime additions are looked up before the seeded entries and are lost on
/// restart.
pub struct BuiltinDictionary {
    added: RwLock<Vec<MerchantEntry>>,
}

impl BuiltinDictionary {
    pub fn new() -> Self {
        Self {
            added: RwLock::new(Vec::new()),
        }
    }

    /// The seeded entries only
    pub fn seeded() -> Vec<MerchantEntry> {
        BUILTIN_MERCHANTS
            .iter()
            .map(|(alias, canonical)| MerchantEntry::new(alias, canonical))
            .collect()
    }
}

impl Default for BuiltinDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl MerchantDictionary for BuiltinDictionary {
    fn entries(&self) -> Result<Vec<MerchantEntry>> {
        let added = self
            .added
            .read()
            .map_err(|_| Error::InvalidData("Merchant dictionary lock poisoned".to_string()))?;
        Ok(added.iter().cloned().chain(Self::seeded()).collect())
    }

    fn add(&self, alias: &str, canonical: &str) -> Result<()> {
        let entry = validate_entry(alias, canonical)?;
        let mut added = self
            .added
            .write()
            .map_err(|_| Error::InvalidData("Merchant dictionary lock poisoned".to_string()))?;
        added.retain(|e| e.alias != entry.alias);
        added.insert(0, entry);
        Ok(())
    }
}

/// Check an alias/canonical pair before it is stored
pub fn validate_entry(alias: &str, canonical: &str) -> Result<MerchantEntry> {
    let entry = MerchantEntry::new(alias, canonical);
    if entry.alias.chars().count() < 3 {
        return Err(Error::InvalidData(
            "Merchant alias must be at least 3 characters".to_string(),
        ));
    }
    if entry.canonical.is_empty() {
        return Err(Error::InvalidData(
            "Canonical merchant name is required".to_string(),
        ));
    }
    Ok(entry)
}

/// Resolves raw vendor strings against a dictionary
#[derive(Clone)]
pub struct MerchantNormalizer {
    dictionary: Arc<dyn MerchantDictionary>,
}

impl MerchantNormalizer {
    pub fn new(dictionary: Arc<dyn MerchantDictionary>) -> Self {
        Self { dictionary }
    }

    /// A normalizer over the built-in dictionary
    pub fn builtin() -> Self {
        Self::new(Arc::new(BuiltinDictionary::new()))
    }

    /// Add a dictionary entry at runtime
    pub fn add_merchant(&self, alias: &str, canonical: &str) -> Result<()> {
        self.dictionary.add(alias, canonical)
    }

    /// Normalize one raw vendor string
    pub fn normalize(&self, raw: &str) -> NormalizedVendor {
        let cleaned = raw.trim().to_lowercase();
        if cleaned.is_empty() {
            return NormalizedVendor {
                vendor: UNKNOWN_VENDOR.to_string(),
                confidence: Confidence::Low,
            };
        }

        let entries = self.dictionary.entries().unwrap_or_else(|e| {
            warn!(error = %e, "Merchant dictionary unavailable, using built-in entries");
            BuiltinDictionary::seeded()
        });

        if let Some(entry) = entries.iter().find(|e| cleaned.contains(&e.alias)) {
            return NormalizedVendor {
                vendor: entry.canonical.clone(),
                confidence: Confidence::High,
            };
        }

        // Unique canonical names, first-seen order, for a deterministic best match
        let mut seen = HashSet::new();
        let canonicals: Vec<&str> = entries
            .iter()
            .filter(|e| seen.insert(e.canonical.as_str()))
            .map(|e| e.canonical.as_str())
            .collect();

        let best = canonicals
            .iter()
            .map(|name| (*name, dice_coefficient(&cleaned, &name.to_lowercase())))
            .fold(None::<(&str, f64)>, |best, (name, score)| match best {
                Some((_, s)) if s >= score => best,
                _ => Some((name, score)),
            });

        if let Some((name, score)) = best {
            debug!(raw, matched = name, score, "Fuzzy merchant match");
            if score >= HIGH_SIMILARITY {
                return NormalizedVendor {
                    vendor: name.to_string(),
                    confidence: Confidence::High,
                };
            }
            if score >= MEDIUM_SIMILARITY {
                return NormalizedVendor {
                    vendor: name.to_string(),
                    confidence: Confidence::Medium,
                };
            }
        }

        NormalizedVendor {
            vendor: title_case(raw.trim()),
            confidence: Confidence::Low,
        }
    }
}

/// Sørensen-Dice coefficient over character bigrams, ignoring whitespace
pub fn dice_coefficient(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().filter(|c| !c.is_whitespace()).collect();
    let b: Vec<char> = b.chars().filter(|c| !c.is_whitespace()).collect();

    if a == b {
        return 1.0;
    }
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }

    let mut bigrams: HashMap<(char, char), usize> = HashMap::new();
    for pair in a.windows(2) {
        *bigrams.entry((pair[0], pair[1])).or_insert(0) += 1;
    }

    let mut shared = 0;
    for pair in b.windows(2) {
        if let Some(count) = bigrams.get_mut(&(pair[0], pair[1])) {
            if *count > 0 {
                *count -= 1;
                shared += 1;
            }
        }
    }

    (2 * shared) as f64 / (a.len() + b.len() - 2) as f64
}

/// Uppercase the first letter of each word, lowercase the rest
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
