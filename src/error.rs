use thiserror::Error;

use crate::semantic::ModelError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures surfaced by the embedding pipeline. None of them are retried
/// internally; a rerun resumes from whatever was durably committed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage unavailable while {context}")]
    StorageUnavailable {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to persist embeddings for a batch of {batch_len} records")]
    StorageWriteFailure {
        batch_len: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("embedding model failed: {reason}")]
    EmbeddingFailure {
        reason: String,
        #[source]
        source: Option<ModelError>,
    },

    #[error(
        "index write failed on chunk {chunk_index} ({chunk_len} ids); {published} ids were published before the failure"
    )]
    IndexWriteFailure {
        chunk_index: usize,
        chunk_len: usize,
        published: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl PipelineError {
    pub fn storage_unavailable(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::StorageUnavailable {
            context: context.into(),
            source,
        }
    }

    pub fn embedding(reason: impl Into<String>) -> Self {
        Self::EmbeddingFailure {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::StorageUnavailable { .. } => "storage_unavailable",
            Self::StorageWriteFailure { .. } => "storage_write_failure",
            Self::EmbeddingFailure { .. } => "embedding_failure",
            Self::IndexWriteFailure { .. } => "index_write_failure",
            Self::ConfigurationError(_) => "configuration_error",
        }
    }
}
