//! Cache and backend configuration
//!
//! Configuration can be built programmatically, loaded from a JSON/TOML
//! file, or overridden through `RECALL_*` environment variables. Invalid
//! values are rejected at construction time so a misconfigured cache fails
//! fast rather than on first use.

use crate::error::{RecallError, RecallResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default wall-clock timeout for one worker subprocess round trip
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(20);

/// Default embedding dimension, matching the default sentence-encoder model
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;

/// Configuration for a cache instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Maximum number of entries held by the cache
    pub cache_capacity: usize,

    /// TTL applied to entries stored without an explicit TTL
    #[serde(with = "humantime_serde")]
    pub default_ttl: Option<Duration>,

    /// Minimum cosine similarity for an approximate hit, in (0, 1]
    pub semantic_threshold: f32,

    /// Wall-clock budget for one embedding worker round trip
    #[serde(with = "humantime_serde")]
    pub worker_timeout: Duration,

    /// Dimension of every embedding stored in this cache instance
    pub embedding_dimension: usize,

    /// Name of the embedding model requested from backends
    pub model_name: String,

    /// Worker program and arguments, spawned fresh per embedding call
    pub worker_command: Vec<String>,

    /// Try the worker-isolated backend before the in-process one.
    /// Useful on platforms where the native runtime is known to be unstable.
    pub prefer_isolated: bool,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            default_ttl: Some(Duration::from_secs(3600)),
            semantic_threshold: 0.85,
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            model_name: "all-MiniLM-L6-v2".to_string(),
            worker_command: vec!["recall-embed-worker".to_string()],
            prefer_isolated: false,
        }
    }
}

impl RecallConfig {
    /// Load configuration from a file, with `RECALL_*` environment
    /// variables taking precedence over file values.
    pub fn from_file(path: impl AsRef<Path>) -> RecallResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("RECALL"))
            .build()?;
        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from environment variables on top of defaults
    pub fn from_env() -> RecallResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("RECALL"))
            .build()?;
        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every recognized option, returning a fatal error on the first
    /// invalid one.
    pub fn validate(&self) -> RecallResult<()> {
        if self.cache_capacity == 0 {
            return Err(RecallError::config("cache_capacity must be greater than 0"));
        }
        if self.embedding_dimension == 0 {
            return Err(RecallError::config(
                "embedding_dimension must be greater than 0",
            ));
        }
        if !(self.semantic_threshold > 0.0 && self.semantic_threshold <= 1.0) {
            return Err(RecallError::config(format!(
                "semantic_threshold must be in (0, 1], got {}",
                self.semantic_threshold
            )));
        }
        if self.worker_timeout.is_zero() {
            return Err(RecallError::config("worker_timeout must be non-zero"));
        }
        if self.worker_command.is_empty() || self.worker_command[0].trim().is_empty() {
            return Err(RecallError::config("worker_command must name a program"));
        }
        if self.model_name.trim().is_empty() {
            return Err(RecallError::config("model_name must be non-empty"));
        }
        Ok(())
    }
}
