//! File-backed cache: one JSON blob per key.
//!
//! Layout: `{cache_dir}/{key}.json`
//!
//! - Writes are atomic (write to .tmp, rename into place)
//! - An in-process lock serializes access so a reader never sees a half-written blob
//! - Undecodable blobs are logged, evicted, and reported as misses

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;

use crate::adapters::atomic_file::write_atomic;
use crate::domain::cache_key::CacheKey;
use crate::domain::error::EtfDeskError;
use crate::ports::cache_port::{CacheEntry, CachePayload, CacheStats, CacheStore};
use crate::ports::clock_port::Clock;

const BLOB_EXTENSION: &str = "json";

pub struct FileCache {
    cache_dir: PathBuf,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl FileCache {
    pub fn new(cache_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        FileCache {
            cache_dir: cache_dir.into(),
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", key.as_str(), BLOB_EXTENSION))
    }

    /// Reads and decodes one blob. `Ok(None)` if the file does not exist.
    fn read_entry(&self, path: &Path, key: &str) -> Result<Option<CacheEntry>, EtfDeskError> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EtfDeskError::CacheCorruption {
                    key: key.to_string(),
                    reason: format!("unreadable: {e}"),
                })
            }
        };
        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| EtfDeskError::CacheCorruption {
                key: key.to_string(),
                reason: format!("undecodable: {e}"),
            })?;
        entry
            .payload
            .check()
            .map_err(|e| EtfDeskError::CacheCorruption {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(entry))
    }

    fn blob_files(&self) -> Result<Vec<PathBuf>, EtfDeskError> {
        let dir = match fs::read_dir(&self.cache_dir) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        for item in dir {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(BLOB_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn evict(path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to evict cache blob");
            }
        }
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl CacheStore for FileCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let _guard = self.guard();
        let path = self.blob_path(key);
        match self.read_entry(&path, key.as_str()) {
            Ok(Some(entry)) if entry.is_expired(self.clock.now()) => {
                tracing::debug!(key = %key, "cache entry expired, evicting");
                Self::evict(&path);
                None
            }
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "treating corrupted cache entry as a miss");
                Self::evict(&path);
                None
            }
        }
    }

    fn put(&self, key: &CacheKey, payload: CachePayload, ttl: Duration) -> Result<(), EtfDeskError> {
        let entry = CacheEntry::new(key, payload, self.clock.now(), ttl);
        let bytes = serde_json::to_vec(&entry)?;
        let _guard = self.guard();
        write_atomic(&self.blob_path(key), &bytes)?;
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, EtfDeskError> {
        let _guard = self.guard();
        match fs::remove_file(self.blob_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<usize, EtfDeskError> {
        let _guard = self.guard();
        let files = self.blob_files()?;
        let mut removed = 0;
        for path in files {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    fn clear_expired(&self) -> Result<usize, EtfDeskError> {
        let _guard = self.guard();
        let now = self.clock.now();
        let mut removed = 0;
        for path in self.blob_files()? {
            let stale = match self.read_entry(&path, &stem(&path)) {
                Ok(Some(entry)) => entry.is_expired(now),
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!(error = %e, "pruning corrupted cache entry");
                    true
                }
            };
            if stale {
                Self::evict(&path);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn stats(&self) -> Result<CacheStats, EtfDeskError> {
        let _guard = self.guard();
        let now = self.clock.now();
        let mut stats = CacheStats::default();
        for path in self.blob_files()? {
            stats.total += 1;
            stats.bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match self.read_entry(&path, &stem(&path)) {
                Ok(Some(entry)) if !entry.is_expired(now) => stats.valid += 1,
                _ => stats.expired += 1,
            }
        }
        Ok(stats)
    }
}
