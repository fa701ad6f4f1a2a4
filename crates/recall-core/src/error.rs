//! Error types for Recall

use thiserror::Error;

/// Result type alias for Recall operations
pub type RecallResult<T> = Result<T, RecallError>;

/// Main error type for Recall
///
/// Backend failures are deliberately absent here: they are absorbed inside
/// the embedding resilience chain and never surface to callers of the cache.
#[derive(Error, Debug)]
pub enum RecallError {
    /// Configuration errors, fatal at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model loading or inference errors
    #[error("Model error: {0}")]
    Model(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RecallError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }
}

impl From<config::ConfigError> for RecallError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
