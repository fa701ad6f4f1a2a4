//! Embedding computation subsystem
//!
//! Three backend variants sit behind one trait: an in-process model (fast,
//! may be unavailable), a subprocess-isolated worker (slow, survives a
//! crashing native runtime), and a deterministic content-derived fallback
//! that can never fail. `BackendSelector` composes them into a resilience
//! chain whose `embed` never returns an error.

pub mod fallback;
pub mod in_process;
pub mod selector;
pub mod worker;


pub use fallback::DeterministicFallbackBackend;
pub use in_process::{InProcessModelBackend, ModelLoader, TextModel};
pub use selector::BackendSelector;
pub use worker::WorkerProcessBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Ways an embedding backend can fail.
///
/// Every variant is recoverable: the selector absorbs failures and advances
/// to the next candidate, terminating in the fallback which cannot fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendFailure {
    /// Backend cannot serve requests (failed construction, dead runtime,
    /// unspawnable worker)
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Worker round trip exceeded its wall-clock budget
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),

    /// Backend produced output that does not follow the protocol
    #[error("malformed backend output: {0}")]
    MalformedOutput(String),

    /// The model itself reported an error
    #[error("model error: {0}")]
    ModelError(String),
}

/// One embedding request sent to a worker process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRequest {
    /// Model the worker should load
    pub model: String,
    /// Texts to embed, order-preserving
    pub texts: Vec<String>,
}

/// One embedding response read back from a worker process.
///
/// Exactly one of `embeddings` and `error` is expected; anything else is
/// treated as malformed output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Capability shared by all embedding backends: turn texts into vectors.
///
/// Implementations must return one vector per input text, in input order,
/// and must not retain the inputs after returning.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Short stable name used in logs
    fn name(&self) -> &str;

    /// Embed a non-empty batch of texts
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendFailure>;
}
