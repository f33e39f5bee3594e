//! Cache store port.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::cache_key::CacheKey;
use crate::domain::error::EtfDeskError;
use crate::domain::ohlcv::PriceSeries;
use crate::domain::raw::EtfListing;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CachePayload {
    Series(PriceSeries),
    SymbolList(Vec<EtfListing>),
}

impl CachePayload {
    /// Re-checks payload invariants after decoding a stored blob.
    pub fn check(&self) -> Result<(), EtfDeskError> {
        match self {
            CachePayload::Series(series) => series.check(),
            CachePayload::SymbolList(_) => Ok(()),
        }
    }
}

/// Immutable once created; a newer `put` under the same key supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: CachePayload,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: i64,
}

impl CacheEntry {
    pub fn new(key: &CacheKey, payload: CachePayload, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        CacheEntry {
            key: key.as_str().to_string(),
            payload,
            created_at,
            ttl_secs: ttl.num_seconds(),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_secs)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + self.ttl()
    }

    /// Stale once its age strictly exceeds the TTL.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
    pub bytes: u64,
}

/// Keyed snapshot store with TTL semantics.
///
/// `get` on a stale or unreadable entry is a miss and evicts it. Each key
/// holds one authoritative value; the last successful `put` wins.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    fn put(&self, key: &CacheKey, payload: CachePayload, ttl: Duration) -> Result<(), EtfDeskError>;

    /// Evicts one key. Returns whether anything was removed.
    fn remove(&self, key: &CacheKey) -> Result<bool, EtfDeskError>;

    /// Evicts everything. Idempotent.
    fn clear(&self) -> Result<usize, EtfDeskError>;

    fn clear_expired(&self) -> Result<usize, EtfDeskError>;

    fn stats(&self) -> Result<CacheStats, EtfDeskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strict() {
        let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let entry = CacheEntry::new(
            &CacheKey::symbol_list("US"),
            CachePayload::SymbolList(vec![]),
            created,
            Duration::hours(24),
        );
        assert!(!entry.is_expired(created + Duration::hours(24)));
        assert!(entry.is_expired(created + Duration::hours(24) + Duration::seconds(1)));
    }

    #[test]
    fn payload_serializes_with_tag() {
        let payload = CachePayload::SymbolList(vec![EtfListing {
            symbol: "SPY".into(),
            name: "SPDR S&P 500 ETF".into(),
        }]);
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"kind\":\"symbol_list\""));
    }
}
