//! Token optimizer: the get-or-compute front door
//!
//! Wires cost accounting on top of the semantic cache. `resolve` tries an
//! exact hit, then an approximate hit at the configured threshold, and only
//! then invokes the caller's expensive compute function — the optimizer is
//! the sole caller of that function.

use crate::cache::SemanticCache;
use crate::config::RecallConfig;
use crate::embedding::BackendSelector;
use crate::error::RecallResult;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// How a resolution was served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitKind {
    Exact,
    Semantic,
    Miss,
}

/// Outcome of one `resolve` call
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Response text, cached or freshly computed
    pub response: String,
    /// On a hit: the cost saved. On a miss: the cost just spent.
    pub token_cost: u64,
    pub cache_hit: bool,
    pub hit_kind: HitKind,
    /// Similarity score for semantic hits
    pub similarity: Option<f32>,
}

/// Pure token-cost collaborator
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> u64;
}

/// Character-count heuristic (~4 characters per token), used when the
/// caller does not supply a real tokenizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> u64 {
        (text.chars().count() as u64).div_ceil(4)
    }
}

/// Cumulative accounting across resolutions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizerStats {
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
    /// Token costs of hits that did not have to be recomputed
    pub tokens_saved: u64,
    /// Token costs actually paid on misses
    pub tokens_spent: u64,
}

/// Get-or-compute orchestrator over the semantic cache
pub struct TokenOptimizer {
    cache: SemanticCache,
    semantic_threshold: f32,
    token_counter: Box<dyn TokenCounter>,
    stats: Mutex<OptimizerStats>,
}

impl TokenOptimizer {
    /// Fails fast on invalid configuration
    pub fn new(config: &RecallConfig, backends: Arc<BackendSelector>) -> RecallResult<Self> {
        Ok(Self {
            cache: SemanticCache::new(config, backends)?,
            semantic_threshold: config.semantic_threshold,
            token_counter: Box::new(HeuristicTokenCounter),
            stats: Mutex::new(OptimizerStats::default()),
        })
    }

    /// Swap in a real tokenizer-backed counter
    pub fn with_token_counter(mut self, counter: Box<dyn TokenCounter>) -> Self {
        self.token_counter = counter;
        self
    }

    /// The underlying cache, e.g. for telemetry polling
    pub fn cache(&self) -> &SemanticCache {
        &self.cache
    }

    /// Resolve a query: exact hit, else semantic hit, else compute and
    /// store. The only error that escapes is a `compute_fn` failure on a
    /// miss — propagated unchanged, never retried, never stored.
    pub async fn resolve<F, Fut, E>(&self, query: &str, compute_fn: F) -> Result<Resolution, E>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<(String, u64), E>>,
    {
        if let Some(entry) = self.cache.get_exact(query).await {
            debug!(kind = "exact", cost_saved = entry.token_cost, "cache hit");
            let mut stats = self.stats.lock().await;
            stats.exact_hits += 1;
            stats.tokens_saved += entry.token_cost;
            return Ok(Resolution {
                response: entry.response,
                token_cost: entry.token_cost,
                cache_hit: true,
                hit_kind: HitKind::Exact,
                similarity: None,
            });
        }

        if let Some((entry, similarity)) = self
            .cache
            .get_semantic(query, self.semantic_threshold)
            .await
        {
            debug!(kind = "semantic", similarity, cost_saved = entry.token_cost, "cache hit");
            let mut stats = self.stats.lock().await;
            stats.semantic_hits += 1;
            stats.tokens_saved += entry.token_cost;
            return Ok(Resolution {
                response: entry.response,
                token_cost: entry.token_cost,
                cache_hit: true,
                hit_kind: HitKind::Semantic,
                similarity: Some(similarity),
            });
        }

        let (response, token_cost) = compute_fn(query.to_string()).await?;
        self.cache.put(query, &response, token_cost, None).await;
        let mut stats = self.stats.lock().await;
        stats.misses += 1;
        stats.tokens_spent += token_cost;
        drop(stats);
        debug!(cost = token_cost, "cache miss, computed and stored");
        Ok(Resolution {
            response,
            token_cost,
            cache_hit: false,
            hit_kind: HitKind::Miss,
            similarity: None,
        })
    }

    /// Like [`resolve`](Self::resolve), for compute functions that return
    /// only the response text; the cost is taken from the token counter.
    pub async fn resolve_with<F, Fut, E>(&self, query: &str, compute_fn: F) -> Result<Resolution, E>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        let counter = &self.token_counter;
        self.resolve(query, move |q| async move {
            let response = compute_fn(q).await?;
            let cost = counter.count(&response);
            Ok((response, cost))
        })
        .await
    }

    /// Snapshot of the cumulative accounting
    pub async fn stats(&self) -> OptimizerStats {
        self.stats.lock().await.clone()
    }
}

impl std::fmt::Debug for TokenOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenOptimizer")
            .field("cache", &self.cache)
            .field("semantic_threshold", &self.semantic_threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{BackendFailure, EmbeddingBackend};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MappedBackend {
        map: HashMap<String, Vec<f32>>,
    }

    #[async_trait]
    impl EmbeddingBackend for MappedBackend {
        fn name(&self) -> &str {
            "mapped"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendFailure> {
            Ok(texts
                .iter()
                .map(|t| self.map.get(t).cloned().unwrap_or_else(|| vec![0.0; 3]))
                .collect())
        }
    }

    fn config(dimension: usize) -> RecallConfig {
        RecallConfig {
            cache_capacity: 10,
            embedding_dimension: dimension,
            default_ttl: None,
            semantic_threshold: 0.85,
            ..Default::default()
        }
    }

    fn fallback_optimizer() -> TokenOptimizer {
        TokenOptimizer::new(&config(16), Arc::new(BackendSelector::new(16))).unwrap()
    }

    #[derive(Debug, PartialEq)]
    struct Boom;

    #[tokio::test]
    async fn miss_computes_then_exact_hit_skips_compute() {
        let optimizer = fallback_optimizer();
        let calls = AtomicU32::new(0);

        let first = optimizer
            .resolve("What is Rust?", |q| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, Boom>((format!("answer to {q}"), 42)) }
            })
            .await
            .unwrap();
        assert_eq!(first.hit_kind, HitKind::Miss);
        assert!(!first.cache_hit);
        assert_eq!(first.token_cost, 42);

        let second = optimizer
            .resolve("What is Rust?", |_q| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, Boom>((String::new(), 0)) }
            })
            .await
            .unwrap();
        assert_eq!(second.hit_kind, HitKind::Exact);
        assert!(second.cache_hit);
        assert_eq!(second.response, "answer to What is Rust?");
        assert_eq!(second.token_cost, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn semantically_close_query_is_served_from_cache() {
        let shared = vec![1.0, 0.0, 0.0];
        let map = HashMap::from([
            ("first question".to_string(), shared.clone()),
            ("second question".to_string(), shared),
        ]);
        let selector = BackendSelector::new(3).with_backend(Box::new(MappedBackend { map }));
        let optimizer = TokenOptimizer::new(&config(3), Arc::new(selector)).unwrap();

        optimizer
            .resolve("first question", |_| async {
                Ok::<_, Boom>(("the answer".to_string(), 30))
            })
            .await
            .unwrap();

        let hit = optimizer
            .resolve("second question", |_| async {
                Ok::<_, Boom>(("must not run".to_string(), 999))
            })
            .await
            .unwrap();
        assert_eq!(hit.hit_kind, HitKind::Semantic);
        assert_eq!(hit.response, "the answer");
        // Reported cost is the cost saved, not recomputed.
        assert_eq!(hit.token_cost, 30);
        assert!(hit.similarity.unwrap() > 0.99);
    }

    #[tokio::test]
    async fn compute_failure_propagates_and_stores_nothing() {
        let optimizer = fallback_optimizer();

        let err = optimizer
            .resolve("doomed", |_| async { Err::<(String, u64), _>(Boom) })
            .await
            .unwrap_err();
        assert_eq!(err, Boom);
        assert!(optimizer.cache().is_empty().await);

        // Not retried from cache: the next resolve computes again.
        let ok = optimizer
            .resolve("doomed", |_| async {
                Ok::<_, Boom>(("recovered".to_string(), 5))
            })
            .await
            .unwrap();
        assert_eq!(ok.hit_kind, HitKind::Miss);
    }

    #[tokio::test]
    async fn resolve_with_costs_via_token_counter() {
        let optimizer = fallback_optimizer();
        let result = optimizer
            .resolve_with("q", |_| async { Ok::<_, Boom>("x".repeat(40)) })
            .await
            .unwrap();
        assert_eq!(result.token_cost, 10);
    }

    #[tokio::test]
    async fn stats_accumulate() {
        let optimizer = fallback_optimizer();
        optimizer
            .resolve("q", |_| async { Ok::<_, Boom>(("r".to_string(), 20)) })
            .await
            .unwrap();
        optimizer
            .resolve("q", |_| async { Ok::<_, Boom>((String::new(), 0)) })
            .await
            .unwrap();

        let stats = optimizer.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.exact_hits, 1);
        assert_eq!(stats.tokens_spent, 20);
        assert_eq!(stats.tokens_saved, 20);
    }

    #[test]
    fn heuristic_counter_rounds_up() {
        let counter = HeuristicTokenCounter;
        assert_eq!(counter.count(""), 0);
        assert_eq!(counter.count("abc"), 1);
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count("abcde"), 2);
    }
}
