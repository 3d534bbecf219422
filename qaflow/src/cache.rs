//! Content-addressed cache for stage results.
//!
//! Keys are (stage, input fingerprint); values are normalized stage
//! results with a TTL. Stage calls are idempotent by contract, so
//! `put` is last-writer-wins: any two successful computations for the
//! same fingerprint are equivalent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tracing::warn;

use crate::core::{StageKind, StageResult};

/// Cache key: stage plus input fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The stage that produced the result.
    pub stage: StageKind,
    /// Fingerprint of the normalized input.
    pub fingerprint: String,
}

impl CacheKey {
    /// Creates a key.
    #[must_use]
    pub fn new(stage: StageKind, fingerprint: impl Into<String>) -> Self {
        Self {
            stage,
            fingerprint: fingerprint.into(),
        }
    }
}

/// Store for computed stage results.
///
/// Async so deployments can back it with an external key-value store
/// with native TTL support; correctness only requires the in-memory
/// implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Returns the cached result for a key, or `None` on miss.
    ///
    /// Expired and corrupt entries are misses.
    async fn get(&self, stage: StageKind, fingerprint: &str) -> Option<StageResult>;

    /// Stores a result with a TTL. Overwrites any existing entry.
    async fn put(&self, stage: StageKind, fingerprint: &str, result: StageResult, ttl: Duration);

    /// Removes one entry.
    async fn invalidate(&self, stage: StageKind, fingerprint: &str);

    /// Removes all entries.
    async fn clear(&self);

    /// Returns true if the cache holds a live entry for the key.
    async fn contains(&self, stage: StageKind, fingerprint: &str) -> bool {
        self.get(stage, fingerprint).await.is_some()
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    /// Serialized result, deserialized on read so a malformed payload
    /// surfaces as corruption rather than a panic.
    raw: String,
    expires_at: DateTime<Utc>,
}

/// In-memory result cache with lazy expiry.
///
/// Entries are evicted on read once expired; no proactive sweep is
/// needed for correctness, only for memory bounds.
#[derive(Debug, Default)]
pub struct InMemoryResultCache {
    entries: DashMap<CacheKey, StoredEntry>,
}

impl InMemoryResultCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries, including not-yet-evicted
    /// expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Test hook: plants a malformed payload under a key.
    #[cfg(test)]
    fn plant_corrupt_entry(&self, key: CacheKey) {
        self.entries.insert(
            key,
            StoredEntry {
                raw: "{not json".to_string(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            },
        );
    }
}

#[async_trait]
impl ResultCache for InMemoryResultCache {
    async fn get(&self, stage: StageKind, fingerprint: &str) -> Option<StageResult> {
        let key = CacheKey::new(stage, fingerprint);

        let entry = self.entries.get(&key)?.clone();
        if entry.expires_at <= Utc::now() {
            drop(self.entries.remove(&key));
            return None;
        }

        match serde_json::from_str::<StageResult>(&entry.raw) {
            Ok(result) => Some(result),
            Err(e) => {
                // Corrupt payloads are treated as a miss and dropped.
                warn!(
                    stage = %stage,
                    fingerprint = %fingerprint,
                    error = %e,
                    "corrupt cache entry evicted"
                );
                drop(self.entries.remove(&key));
                None
            }
        }
    }

    async fn put(&self, stage: StageKind, fingerprint: &str, result: StageResult, ttl: Duration) {
        let raw = match serde_json::to_string(&result) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(stage = %stage, error = %e, "unserializable result not cached");
                return;
            }
        };

        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        self.entries.insert(
            CacheKey::new(stage, fingerprint),
            StoredEntry { raw, expires_at },
        );
    }

    async fn invalidate(&self, stage: StageKind, fingerprint: &str) {
        self.entries.remove(&CacheKey::new(stage, fingerprint));
    }

    async fn clear(&self) {
        self.entries.clear();
    }
}
