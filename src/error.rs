//! Error taxonomy for the docqa pipeline.
//!
//! Library operations return [`RagError`]; the CLI wraps it in `anyhow`
//! for display. Per-document ingestion failures never surface here directly:
//! they are collected into an [`ingest::BatchReport`](crate::ingest::BatchReport).

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by configuration, ingestion, indexing, and query.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A file could not be read or parsed into pages.
    #[error("extraction failed for {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    /// A vector does not match the index dimensionality. Indicates an
    /// embedder/index version mismatch that requires a full re-index.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// No documents have been ingested yet.
    #[error("no documents indexed yet; add documents first")]
    EmptyIndex,

    /// The index matched records but none of their passages could be loaded
    /// from the store. Re-running ingest repairs it.
    #[error("index and document store are out of sync; re-run ingest")]
    NoPassages,

    /// Answer generation failed after exhausting its retry budget.
    #[error("answer generation failed after {attempts} attempt(s): {reason}")]
    Generator { attempts: u32, reason: String },

    /// The embedding call failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The question or result count is unusable.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Retrieved passages exist but none fits the context budget.
    #[error("no retrieved passage fits the context budget of {budget} tokens (smallest needs {smallest})")]
    ContextBudget { budget: usize, smallest: usize },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Whether this error means "nothing to answer from" rather than a fault.
    pub fn is_empty_index(&self) -> bool {
        matches!(self, RagError::EmptyIndex)
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, RagError>;
