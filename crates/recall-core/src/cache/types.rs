//! Cache entry and statistics types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One cached response with its embedding and bookkeeping.
///
/// Exclusively owned by the cache: created on miss, mutated on successful
/// lookup, destroyed on eviction, expiry, or clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Normalized query text, the store key
    pub normalized_key: String,
    /// Query text as the caller supplied it
    pub original_query: String,
    /// Cached response body
    pub response: String,
    /// Embedding of the normalized query; same dimension for every entry
    /// of a cache instance
    pub embedding: Vec<f32>,
    /// Tokens the original computation cost
    pub token_cost: u64,
    /// When the entry was created (reset on overwrite)
    pub created_at: DateTime<Utc>,
    /// When the entry expires; `None` means it only leaves under capacity
    /// pressure
    pub expires_at: Option<DateTime<Utc>>,
    /// Successful lookups served by this entry
    pub usage_count: u64,
    /// Last successful lookup (or creation)
    pub last_used_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        normalized_key: impl Into<String>,
        original_query: impl Into<String>,
        response: impl Into<String>,
        embedding: Vec<f32>,
        token_cost: u64,
        ttl: Option<Duration>,
    ) -> Self {
        let now = Utc::now();
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| now + ttl);
        Self {
            normalized_key: normalized_key.into(),
            original_query: original_query.into(),
            response: response.into(),
            embedding,
            token_cost,
            created_at: now,
            expires_at,
            usage_count: 0,
            last_used_at: now,
        }
    }

    /// Whether the TTL has elapsed
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiry check against a caller-supplied instant, so one scan uses a
    /// single consistent clock reading
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Record a successful lookup
    pub fn mark_used(&mut self) {
        self.usage_count += 1;
        self.last_used_at = Utc::now();
    }
}

/// Counters exposed to telemetry sinks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Hits served by normalized-key equality
    pub exact_hits: u64,
    /// Hits served by similarity search
    pub semantic_hits: u64,
    /// Lookups that found nothing live
    pub misses: u64,
    /// Entries removed under capacity pressure
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// Live entries right now
    pub entry_count: usize,
    /// Configured capacity
    pub capacity: usize,
}

impl CacheStats {
    /// Hits of either kind
    pub fn hits(&self) -> u64 {
        self.exact_hits + self.semantic_hits
    }

    /// Fraction of lookups served from cache, 0.0 when idle
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_elapses() {
        let entry = CacheEntry::new("k", "k", "r", vec![0.0], 1, Some(Duration::from_secs(60)));
        assert!(!entry.is_expired());
        let later = Utc::now() + chrono::Duration::seconds(120);
        assert!(entry.is_expired_at(later));
    }

    #[test]
    fn no_ttl_never_expires() {
        let entry = CacheEntry::new("k", "k", "r", vec![0.0], 1, None);
        let later = Utc::now() + chrono::Duration::days(365);
        assert!(!entry.is_expired_at(later));
    }

    #[test]
    fn mark_used_updates_bookkeeping() {
        let mut entry = CacheEntry::new("k", "k", "r", vec![0.0], 1, None);
        let before = entry.last_used_at;
        entry.mark_used();
        entry.mark_used();
        assert_eq!(entry.usage_count, 2);
        assert!(entry.last_used_at >= before);
    }

    #[test]
    fn hit_rate() {
        let stats = CacheStats {
            exact_hits: 2,
            semantic_hits: 1,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < 1e-9);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
