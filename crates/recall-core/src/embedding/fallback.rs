//! Deterministic content-derived embedding fallback
//!
//! The terminal step of the resilience chain. Vectors are derived purely
//! from the text content via SHA-256, so identical text always produces a
//! bit-identical vector and no external runtime is involved. These vectors
//! carry no semantic signal: two paraphrases land nearly orthogonal, so
//! approximate lookup quietly degrades to exact-equivalence matching.

use super::{BackendFailure, EmbeddingBackend};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Derive a unit-length vector of the given dimension from text content.
///
/// The digest is re-keyed with a block counter until enough bytes are
/// available, each 4-byte chunk mapping to one component in [-1, 1].
pub fn content_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(dimension);
    let mut block: u32 = 0;
    while out.len() < dimension {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(block.to_le_bytes());
        let digest = hasher.finalize();
        for chunk in digest.chunks_exact(4) {
            if out.len() == dimension {
                break;
            }
            let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            out.push((bits as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        block += 1;
    }

    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut out {
            *v /= norm;
        }
    }
    out
}

/// Embedding backend that cannot fail
#[derive(Debug, Clone)]
pub struct DeterministicFallbackBackend {
    dimension: usize,
}

impl DeterministicFallbackBackend {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Infallible batch encoding, used directly by the selector's terminal
    /// step
    pub fn vectors(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|text| content_vector(text, self.dimension))
            .collect()
    }
}

#[async_trait]
impl EmbeddingBackend for DeterministicFallbackBackend {
    fn name(&self) -> &str {
        "deterministic-fallback"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendFailure> {
        Ok(self.vectors(texts))
    }
}
