//! In-process cache store, for tests and one-shot library use.

use crate::cache::{CacheEntry, CacheKey, CacheLookup, CacheStats, CacheStore, MissReason};
use crate::error::CacheError;
use crate::model::ContentFingerprint;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Cache store backed by a `HashMap` keyed by fingerprint alone, so the
/// document name never affects a hit.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<ContentFingerprint, CacheEntry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ContentFingerprint, CacheEntry>> {
        // A panic while holding the lock cannot leave a half-inserted entry.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CacheStore for InMemoryCacheStore {
    fn lookup(&self, key: &CacheKey) -> CacheLookup {
        match self.lock().get(&key.fingerprint) {
            Some(entry) => CacheLookup::Hit(entry.clone()),
            None => CacheLookup::Miss(MissReason::Absent),
        }
    }

    fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
        self.lock().insert(key.fingerprint.clone(), entry.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.lock().clear();
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = self.lock();
        Ok(CacheStats {
            entries: entries.len(),
            sentinels: entries.values().filter(|e| e.is_sentinel()).count(),
            total_bytes: 0,
        })
    }
}
