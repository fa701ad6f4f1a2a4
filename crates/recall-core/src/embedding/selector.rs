//! Backend resilience chain
//!
//! Tries candidates in preference order, remembers which ones are beyond
//! saving for the rest of the process, and terminates in the deterministic
//! fallback. `embed` never returns an error: the caller always gets one
//! vector per text, possibly of degraded quality.
//!
//! Health state is owned by the selector instance. Independent cache
//! instances never share it, and it is never persisted.

use super::fallback::DeterministicFallbackBackend;
use super::in_process::{InProcessModelBackend, ModelLoader};
use super::worker::WorkerProcessBackend;
use super::{BackendFailure, EmbeddingBackend};
use crate::config::RecallConfig;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, info, warn};

/// Consecutive model errors after which a candidate is flagged known-bad
const MODEL_ERROR_LIMIT: u32 = 3;

struct Candidate {
    backend: Box<dyn EmbeddingBackend>,
    /// Race-tolerant: a missed or duplicated store costs one extra failed
    /// call, never correctness.
    known_bad: AtomicBool,
    model_errors: AtomicU32,
}

impl Candidate {
    fn new(backend: Box<dyn EmbeddingBackend>) -> Self {
        Self {
            backend,
            known_bad: AtomicBool::new(false),
            model_errors: AtomicU32::new(0),
        }
    }
}

/// Ordered chain of embedding backends ending in an infallible fallback
pub struct BackendSelector {
    candidates: Vec<Candidate>,
    fallback: DeterministicFallbackBackend,
    dimension: usize,
}

impl BackendSelector {
    /// A chain with no real backends: every call lands on the fallback
    pub fn new(dimension: usize) -> Self {
        Self {
            candidates: Vec::new(),
            fallback: DeterministicFallbackBackend::new(dimension),
            dimension,
        }
    }

    /// Append a candidate ahead of the fallback
    pub fn with_backend(mut self, backend: Box<dyn EmbeddingBackend>) -> Self {
        self.candidates.push(Candidate::new(backend));
        self
    }

    /// Build the standard chain from configuration: in-process model (when
    /// a loader is supplied), then the worker process, then the fallback.
    /// `prefer_isolated` swaps the first two.
    pub fn from_config(config: &RecallConfig, loader: Option<&dyn ModelLoader>) -> Self {
        let mut selector = Self::new(config.embedding_dimension);

        let in_process = loader
            .map(|l| InProcessModelBackend::load(l, &config.model_name))
            .map(|b| Box::new(b) as Box<dyn EmbeddingBackend>);
        let worker = WorkerProcessBackend::new(
            config.worker_command.clone(),
            config.model_name.clone(),
            config.worker_timeout,
        )
        .ok()
        .map(|b| Box::new(b) as Box<dyn EmbeddingBackend>);

        let ordered = if config.prefer_isolated {
            [worker, in_process]
        } else {
            [in_process, worker]
        };
        for backend in ordered.into_iter().flatten() {
            selector = selector.with_backend(backend);
        }
        selector
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a non-empty batch. Never fails; the deterministic fallback
    /// terminates the chain with a result.
    pub async fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        for candidate in &self.candidates {
            if candidate.known_bad.load(Ordering::Relaxed) {
                continue;
            }
            match candidate.backend.embed(texts).await {
                Ok(vectors) => match self.check_shape(&vectors, texts.len()) {
                    Ok(()) => {
                        candidate.model_errors.store(0, Ordering::Relaxed);
                        debug!(backend = candidate.backend.name(), "embedding served");
                        return vectors;
                    }
                    Err(reason) => {
                        self.note_failure(candidate, &BackendFailure::MalformedOutput(reason));
                    }
                },
                Err(failure) => self.note_failure(candidate, &failure),
            }
        }
        debug!(backend = self.fallback.name(), "embedding served");
        self.fallback.vectors(texts)
    }

    fn check_shape(&self, vectors: &[Vec<f32>], expected: usize) -> Result<(), String> {
        if vectors.len() != expected {
            return Err(format!("expected {expected} vectors, got {}", vectors.len()));
        }
        for (index, vector) in vectors.iter().enumerate() {
            if vector.len() != self.dimension {
                return Err(format!(
                    "vector {index} has dimension {}, expected {}",
                    vector.len(),
                    self.dimension
                ));
            }
        }
        Ok(())
    }

    fn note_failure(&self, candidate: &Candidate, failure: &BackendFailure) {
        let backend = candidate.backend.name();
        warn!(backend, %failure, "embedding backend failed, trying next candidate");
        match failure {
            BackendFailure::Unavailable(_) => self.flag(candidate),
            BackendFailure::ModelError(_) => {
                let seen = candidate.model_errors.fetch_add(1, Ordering::Relaxed) + 1;
                if seen >= MODEL_ERROR_LIMIT {
                    self.flag(candidate);
                }
            }
            // Transient: retried on the next call
            BackendFailure::Timeout(_) | BackendFailure::MalformedOutput(_) => {}
        }
    }

    fn flag(&self, candidate: &Candidate) {
        if !candidate.known_bad.swap(true, Ordering::Relaxed) {
            info!(
                backend = candidate.backend.name(),
                "backend marked known-bad for the rest of this process"
            );
        }
    }
}

impl std::fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self
            .candidates
            .iter()
            .map(|c| c.backend.name())
            .collect();
        f.debug_struct("BackendSelector")
            .field("candidates", &names)
            .field("dimension", &self.dimension)
            .finish()
    }
}
