//! Error taxonomy for the retrieval and generation pipeline.
//!
//! Each stage has its own error type so callers can tell a bad
//! configuration from a flaky store or a failed generation call.
//! [`PipelineError`] wraps them all for the orchestrator's public API.

use std::fmt;

use thiserror::Error;

/// A single invalid configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every invalid field of a configuration, collected in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {}", join_fields(.errors))]
pub struct ConfigError {
    pub errors: Vec<FieldError>,
}

impl ConfigError {
    /// Returns `true` if `field` is among the rejected fields.
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Text chunking failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("cannot split empty or whitespace-only text")]
    EmptyInput,

    #[error("invalid chunking parameters: chunk_size={chunk_size}, chunk_overlap={chunk_overlap}")]
    InvalidParameters {
        chunk_size: usize,
        chunk_overlap: usize,
    },
}

/// Embedding computation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbeddingError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding failed: {0}")]
    Failed(String),
}

/// Vector store failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Insertion stopped at `chunk_id`; the `inserted` chunks before it
    /// in the same batch remain committed.
    #[error("failed to embed chunk {chunk_id} ({inserted} earlier chunks committed): {source}")]
    Embedding {
        chunk_id: String,
        inserted: usize,
        #[source]
        source: EmbeddingError,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Generation backend failures. Fatal to the current query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("no credential configured for backend '{0}'")]
    MissingCredential(String),

    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generation stream failed: {0}")]
    Stream(String),

    #[error("generation backend returned an empty response")]
    EmptyResponse,
}

/// Top-level error returned by [`RagPipeline`](crate::pipeline::RagPipeline).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Chunking(#[from] ChunkError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("question must not be empty")]
    EmptyQuestion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_lists_every_field() {
        let err = ConfigError {
            errors: vec![
                FieldError {
                    field: "temperature",
                    message: "must be in [0, 1]".to_string(),
                },
                FieldError {
                    field: "top_k",
                    message: "must be >= 1".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("temperature: must be in [0, 1]"));
        assert!(msg.contains("top_k: must be >= 1"));
        assert!(err.has_field("top_k"));
        assert!(!err.has_field("model"));
    }

    #[test]
    fn test_store_error_names_chunk() {
        let err = StoreError::Embedding {
            chunk_id: "abc".to_string(),
            inserted: 2,
            source: EmbeddingError::Failed("boom".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("2 earlier chunks"));
    }
}
