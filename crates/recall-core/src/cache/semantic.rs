//! Bounded semantic cache implementation

use super::similarity::{cosine_similarity, SIMILARITY_EPSILON};
use super::types::{CacheEntry, CacheStats};
use crate::config::RecallConfig;
use crate::embedding::fallback::content_vector;
use crate::embedding::BackendSelector;
use crate::error::{RecallError, RecallResult};
use crate::normalize::TextNormalizer;
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Store plus statistics, guarded together: exact-match reads also mutate
/// bookkeeping, so readers take the same lock as writers.
struct CacheInner {
    entries: LruCache<String, CacheEntry>,
    stats: CacheStats,
}

/// Bounded response cache with exact and approximate lookup.
///
/// Embedding computation — which may block for a full worker timeout —
/// always happens outside the store lock; the lock is re-acquired only to
/// insert or compare an already-computed vector.
pub struct SemanticCache {
    inner: Mutex<CacheInner>,
    backends: Arc<BackendSelector>,
    normalizer: TextNormalizer,
    default_ttl: Option<Duration>,
    capacity: usize,
}

impl SemanticCache {
    /// Fails fast on invalid configuration; never fails afterwards.
    pub fn new(config: &RecallConfig, backends: Arc<BackendSelector>) -> RecallResult<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.cache_capacity)
            .ok_or_else(|| RecallError::config("cache_capacity must be greater than 0"))?;
        Ok(Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                stats: CacheStats {
                    capacity: config.cache_capacity,
                    ..Default::default()
                },
            }),
            backends,
            normalizer: TextNormalizer::new(),
            default_ttl: config.default_ttl,
            capacity: config.cache_capacity,
        })
    }

    /// Exact lookup by normalized key. A live hit bumps usage bookkeeping
    /// and refreshes the entry's LRU position. O(1) amortized.
    pub async fn get_exact(&self, query: &str) -> Option<CacheEntry> {
        let key = self.normalizer.normalize(query);
        let mut inner = self.inner.lock().await;

        if inner.entries.peek(&key).is_some_and(|e| e.is_expired()) {
            inner.entries.pop(&key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            inner.stats.entry_count = inner.entries.len();
            return None;
        }

        let snapshot = inner.entries.get_mut(&key).map(|entry| {
            entry.mark_used();
            entry.clone()
        });
        match snapshot {
            Some(entry) => {
                inner.stats.exact_hits += 1;
                Some(entry)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Approximate lookup: cosine similarity of the query embedding against
    /// every live entry, filtered by `threshold`. Ties within a float
    /// epsilon go to the entry with the higher usage count, then the most
    /// recently used one. O(live entries × dimension).
    pub async fn get_semantic(&self, query: &str, threshold: f32) -> Option<(CacheEntry, f32)> {
        let normalized = self.normalizer.normalize(query);

        {
            let mut inner = self.inner.lock().await;
            if inner.entries.is_empty() {
                inner.stats.misses += 1;
                return None;
            }
        }

        let query_vec = self
            .backends
            .embed(std::slice::from_ref(&normalized))
            .await
            .into_iter()
            .next()?;

        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut best: Option<(String, f32, u64, DateTime<Utc>)> = None;
        for (key, entry) in inner.entries.iter() {
            if entry.is_expired_at(now) {
                continue;
            }
            let similarity = cosine_similarity(&query_vec, &entry.embedding);
            if similarity < threshold {
                continue;
            }
            let candidate = (key.clone(), similarity, entry.usage_count, entry.last_used_at);
            best = Some(match best {
                None => candidate,
                Some(incumbent) => {
                    if prefer(&candidate, &incumbent) {
                        candidate
                    } else {
                        incumbent
                    }
                }
            });
        }

        match best {
            Some((key, similarity, _, _)) => {
                let snapshot = inner.entries.get_mut(&key).map(|entry| {
                    entry.mark_used();
                    entry.clone()
                });
                snapshot.map(|entry| {
                    inner.stats.semantic_hits += 1;
                    (entry, similarity)
                })
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Store a response. Overwrites on key collision (resetting usage and
    /// creation bookkeeping); at capacity, reclaims an expired entry if one
    /// exists, otherwise evicts the least recently used. Never fails: under
    /// backend degradation a fallback vector is stored and quality degrades
    /// silently.
    pub async fn put(&self, query: &str, response: &str, token_cost: u64, ttl: Option<Duration>) {
        let key = self.normalizer.normalize(query);
        let embedding = self
            .backends
            .embed(std::slice::from_ref(&key))
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| content_vector(&key, self.backends.dimension()));
        let entry = CacheEntry::new(
            key.clone(),
            query,
            response,
            embedding,
            token_cost,
            ttl.or(self.default_ttl),
        );

        let mut inner = self.inner.lock().await;
        if !inner.entries.contains(&key) && inner.entries.len() >= self.capacity {
            let now = Utc::now();
            let expired_key = inner
                .entries
                .iter()
                .rev()
                .find(|(_, e)| e.is_expired_at(now))
                .map(|(k, _)| k.clone());
            match expired_key {
                Some(victim) => {
                    inner.entries.pop(&victim);
                    inner.stats.expirations += 1;
                }
                None => {
                    if let Some((victim, _)) = inner.entries.pop_lru() {
                        debug!(key = %victim, "evicting least-recently-used entry");
                        inner.stats.evictions += 1;
                    }
                }
            }
        }
        inner.entries.put(key, entry);
        inner.stats.entry_count = inner.entries.len();
    }

    /// Drop every TTL-elapsed entry, returning how many were removed.
    /// Safe to call lazily per access or from a periodic task.
    pub async fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.entries.pop(key);
        }
        inner.stats.expirations += expired.len() as u64;
        inner.stats.entry_count = inner.entries.len();
        if !expired.is_empty() {
            debug!(count = expired.len(), "purged expired entries");
        }
        expired.len()
    }

    /// Explicitly invalidate one entry. Returns whether it existed.
    pub async fn remove(&self, query: &str) -> bool {
        let key = self.normalizer.normalize(query);
        let mut inner = self.inner.lock().await;
        let removed = inner.entries.pop(&key).is_some();
        inner.stats.entry_count = inner.entries.len();
        removed
    }

    /// Drop every entry
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.stats.entry_count = 0;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Snapshot of the counters, for telemetry polling
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        let mut stats = inner.stats.clone();
        stats.entry_count = inner.entries.len();
        stats
    }
}

impl std::fmt::Debug for SemanticCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticCache")
            .field("capacity", &self.capacity)
            .field("default_ttl", &self.default_ttl)
            .field("backends", &self.backends)
            .finish()
    }
}

/// Tie-break rule for approximate lookup winners
fn prefer(
    candidate: &(String, f32, u64, DateTime<Utc>),
    incumbent: &(String, f32, u64, DateTime<Utc>),
) -> bool {
    let (_, c_sim, c_usage, c_used_at) = candidate;
    let (_, i_sim, i_usage, i_used_at) = incumbent;
    if c_sim - i_sim > SIMILARITY_EPSILON {
        return true;
    }
    if i_sim - c_sim > SIMILARITY_EPSILON {
        return false;
    }
    if c_usage != i_usage {
        return c_usage > i_usage;
    }
    c_used_at > i_used_at
}
