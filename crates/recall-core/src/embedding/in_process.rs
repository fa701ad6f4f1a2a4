//! In-process model backend
//!
//! Fastest path when a native text encoder is importable into the host
//! process. The model is loaded exactly once at construction; a failed load
//! leaves the backend permanently unusable for its lifetime rather than
//! retrying the load on every call.

use super::{BackendFailure, EmbeddingBackend};
use crate::error::RecallResult;
use async_trait::async_trait;
use tracing::warn;

/// An opaque text-to-vector model loaded in the host process
pub trait TextModel: Send + Sync {
    /// Model identifier, e.g. "all-MiniLM-L6-v2"
    fn name(&self) -> &str;

    /// Output vector dimension
    fn dimension(&self) -> usize;

    /// Encode a non-empty batch of texts, one vector per text in order
    fn encode(&self, texts: &[String]) -> RecallResult<Vec<Vec<f32>>>;
}

/// Loads a [`TextModel`] by name. Supplied by the embedding runtime the
/// host application links in.
pub trait ModelLoader: Send + Sync {
    fn load(&self, model_name: &str) -> RecallResult<Box<dyn TextModel>>;
}

/// Backend wrapping a load-once in-process model
pub struct InProcessModelBackend {
    model_name: String,
    /// `None` after a failed load: the instance is permanently unusable.
    model: Option<Box<dyn TextModel>>,
}

impl InProcessModelBackend {
    /// Load `model_name` through `loader`. Never fails: a load error is
    /// recorded and every subsequent `embed` call reports `Unavailable`.
    pub fn load(loader: &dyn ModelLoader, model_name: &str) -> Self {
        let model = match loader.load(model_name) {
            Ok(model) => Some(model),
            Err(err) => {
                warn!(model = model_name, error = %err, "in-process model failed to load");
                None
            }
        };
        Self {
            model_name: model_name.to_string(),
            model,
        }
    }

    /// Whether construction succeeded
    pub fn is_usable(&self) -> bool {
        self.model.is_some()
    }
}

impl std::fmt::Debug for InProcessModelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessModelBackend")
            .field("model_name", &self.model_name)
            .field("usable", &self.is_usable())
            .finish()
    }
}

#[async_trait]
impl EmbeddingBackend for InProcessModelBackend {
    fn name(&self) -> &str {
        "in-process"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendFailure> {
        let model = self.model.as_ref().ok_or_else(|| {
            BackendFailure::Unavailable(format!("model {} never loaded", self.model_name))
        })?;
        model
            .encode(texts)
            .map_err(|err| BackendFailure::Unavailable(err.to_string()))
    }
}
