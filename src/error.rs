//! Error taxonomy for the engine and session boundary.
//!
//! Internals (core crate, providers, stores) return `anyhow::Result`.
//! [`QueryEngine`](crate::engine::QueryEngine) and
//! [`Session`](crate::session::Session) classify failures into [`FlowError`]
//! so callers can branch on the kind of failure without string matching.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    /// Missing or invalid configuration or credentials. Not recoverable
    /// without operator action.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The file could not be read, parsed, or held no data. The previous
    /// index generation is still live.
    #[error("failed to ingest {}: {source:#}", .path.display())]
    Ingestion {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("embedding service error: {0:#}")]
    EmbeddingService(#[source] anyhow::Error),

    #[error("generation service error: {0:#}")]
    GenerationService(#[source] anyhow::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("index storage error: {0:#}")]
    Storage(#[source] anyhow::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;

impl FlowError {
    /// Classify an embedding failure, surfacing HTTP client timeouts as
    /// [`FlowError::Timeout`].
    pub fn embedding(err: anyhow::Error, after: Duration) -> Self {
        if is_http_timeout(&err) {
            FlowError::Timeout {
                operation: "embedding",
                after,
            }
        } else {
            FlowError::EmbeddingService(err)
        }
    }

    /// Classify a generation failure, surfacing HTTP client timeouts as
    /// [`FlowError::Timeout`].
    pub fn generation(err: anyhow::Error, after: Duration) -> Self {
        if is_http_timeout(&err) {
            FlowError::Timeout {
                operation: "generation",
                after,
            }
        } else {
            FlowError::GenerationService(err)
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FlowError::EmbeddingService(_) | FlowError::GenerationService(_) | FlowError::Timeout { .. }
        )
    }
}

fn is_http_timeout(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .is_some_and(|e| e.is_timeout())
    })
}
