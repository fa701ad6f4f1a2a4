//! Recall Core Library
//!
//! This crate provides the core functionality for the Recall semantic
//! response cache: text normalization, a resilient multi-tier embedding
//! subsystem, a bounded exact + approximate response cache, and the
//! token optimizer that ties them together.

pub mod cache;
pub mod config;
pub mod embedding;
pub mod error;
pub mod normalize;
pub mod optimizer;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheStats, SemanticCache};
pub use config::RecallConfig;
pub use embedding::{
    BackendFailure, BackendSelector, DeterministicFallbackBackend, EmbedRequest, EmbedResponse,
    EmbeddingBackend, InProcessModelBackend, ModelLoader, TextModel, WorkerProcessBackend,
};
pub use error::{RecallError, RecallResult};
pub use normalize::TextNormalizer;
pub use optimizer::{
    HeuristicTokenCounter, HitKind, OptimizerStats, Resolution, TokenCounter, TokenOptimizer,
};
