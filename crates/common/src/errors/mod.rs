//! Error types for the KBFuse engine
//!
//! Provides a single error enum shared by all stages, with:
//! - Distinct variants for different failure modes
//! - A recoverable/fatal split the orchestrator uses to pick degradation
//! - Conversions from the underlying store, HTTP, and serde errors

use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    // Construction-time errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // Store errors
    #[error("Store error: {0}")]
    Database(#[from] rusqlite::Error),

    // Embedding errors
    #[error("Embedding service error: {message}")]
    EmbeddingUnavailable { message: String },

    #[error("Embedding timeout after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether a query can degrade to BM25-only results instead of aborting.
    ///
    /// Embedding-side failures are recoverable; store and configuration
    /// failures abort the query.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::EmbeddingUnavailable { .. }
                | EngineError::EmbeddingTimeout { .. }
                | EngineError::HttpClient(_)
        )
    }

    /// Shorthand for an embedding-side failure with a message.
    pub fn embedding<S: Into<String>>(message: S) -> Self {
        EngineError::EmbeddingUnavailable {
            message: message.into(),
        }
    }
}
