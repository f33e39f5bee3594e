//! Deterministic cache keys.
//!
//! Identical logical requests map to the same key. Keys double as file
//! stems for the file-backed cache, so only `[A-Za-z0-9._-]` survive.

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn series(symbol: &str, start: NaiveDate, end: NaiveDate) -> Self {
        CacheKey(format!(
            "series_{}_{}_{}",
            normalize(symbol),
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        ))
    }

    pub fn symbol_list(market: &str) -> Self {
        CacheKey(format!("symbols_{}", normalize(market)))
    }

    /// Rebuilds a key from a stored file stem.
    pub fn from_raw(raw: &str) -> Self {
        CacheKey(sanitize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(part: &str) -> String {
    sanitize(&part.trim().to_uppercase())
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
