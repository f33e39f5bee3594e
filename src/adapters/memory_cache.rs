//! In-process cache behind a single coarse lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;

use crate::domain::cache_key::CacheKey;
use crate::domain::error::EtfDeskError;
use crate::ports::cache_port::{CacheEntry, CachePayload, CacheStats, CacheStore};
use crate::ports::clock_port::Clock;

pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        MemoryCache {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored entries, including expired ones.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let expired = entries.get(key)?.is_expired(now);
        if expired {
            tracing::debug!(key = %key, "cache entry expired, evicting");
            entries.remove(key);
            return None;
        }
        entries.get(key).cloned()
    }

    fn put(&self, key: &CacheKey, payload: CachePayload, ttl: Duration) -> Result<(), EtfDeskError> {
        let entry = CacheEntry::new(key, payload, self.clock.now(), ttl);
        self.lock().insert(key.clone(), entry);
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, EtfDeskError> {
        Ok(self.lock().remove(key).is_some())
    }

    fn clear(&self) -> Result<usize, EtfDeskError> {
        let mut entries = self.lock();
        let n = entries.len();
        entries.clear();
        Ok(n)
    }

    fn clear_expired(&self) -> Result<usize, EtfDeskError> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }

    fn stats(&self) -> Result<CacheStats, EtfDeskError> {
        let now = self.clock.now();
        let entries = self.lock();
        let expired = entries.values().filter(|e| e.is_expired(now)).count();
        Ok(CacheStats {
            total: entries.len(),
            valid: entries.len() - expired,
            expired,
            bytes: 0,
        })
    }
}
