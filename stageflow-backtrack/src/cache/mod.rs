//! Result caching for stage invocations.
//!
//! A stage whose inputs, contract and effective configuration are unchanged
//! returns its cached outputs instead of running again. This is what makes
//! targeted repairs cheap: only the mutated stage misses.

use crate::contracts::StageContract;
use crate::stages::{Fields, StageConfig};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Storage backend for stage results.
#[cfg_attr(test, mockall::automock)]
pub trait StageCache: Send + Sync {
    /// Gets cached outputs by key.
    fn get(&self, key: &str) -> Option<Fields>;

    /// Stores outputs under a key.
    fn put(&self, key: String, outputs: Fields);

    /// Clears all entries.
    fn clear(&self);
}

/// Hit/miss counters of a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: usize,
    /// Lookups that found nothing.
    pub misses: usize,
    /// Stored entries.
    pub entries: usize,
}

/// In-memory stage cache.
///
/// Entries are never evicted. Long-lived runtimes should call
/// [`StageCache::clear`] between workloads, or use [`NoCache`].
#[derive(Debug, Default)]
pub struct InMemoryStageCache {
    entries: DashMap<String, Fields>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl InMemoryStageCache {
    /// Creates a new in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the hit/miss counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::SeqCst),
            misses: self.misses.load(Ordering::SeqCst),
            entries: self.entries.len(),
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StageCache for InMemoryStageCache {
    fn get(&self, key: &str) -> Option<Fields> {
        if let Some(entry) = self.entries.get(key) {
            self.hits.fetch_add(1, Ordering::SeqCst);
            return Some(entry.value().clone());
        }
        self.misses.fetch_add(1, Ordering::SeqCst);
        None
    }

    fn put(&self, key: String, outputs: Fields) {
        self.entries.insert(key, outputs);
    }

    fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::SeqCst);
        self.misses.store(0, Ordering::SeqCst);
    }
}

/// A cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl StageCache for NoCache {
    fn get(&self, _key: &str) -> Option<Fields> {
        None
    }

    fn put(&self, _key: String, _outputs: Fields) {}

    fn clear(&self) {}
}

/// Derives the cache key of a stage invocation.
///
/// Any change to the stage name, contract snapshot, inputs or effective
/// configuration yields a different key.
#[must_use]
pub fn cache_key(
    stage: &str,
    contract: &StageContract,
    inputs: &Fields,
    config: &StageConfig,
) -> String {
    let payload = serde_json::json!({
        "stage": stage,
        "contract": contract,
        "inputs": inputs,
        "config": config,
    });

    let json = serde_json::to_string(&payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    let result = hasher.finalize();
    format!("stage:{}", hex::encode(&result[..16]))
}
