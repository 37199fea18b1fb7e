//! Error taxonomy for the ingestion pipeline.
//!
//! Structural failures (unsupported format, missing tool, short extraction)
//! short-circuit a document's ingestion; stage-local recoverable issues are
//! reported as warnings on the outcome instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The file extension is not one of the accepted formats.
    /// Rejected before any processing runs.
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// A required external tool (pdftotext, pdftoppm, tesseract) is not
    /// installed. Surfaced as a configuration error, never as empty text.
    #[error("external tool not found: {0}")]
    MissingDependency(String),

    /// Extraction yielded fewer characters than the configured minimum.
    /// Usually a corrupt, encrypted, or blank source document.
    #[error("extracted only {chars} characters (minimum {min}): document may be empty, password-protected, or corrupt")]
    ExtractionTooShort { chars: usize, min: usize },

    /// An extraction step failed outright (bad PDF, bad ZIP, tool error).
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Embedding failed after exhausting the bounded retry budget.
    /// Fatal for the current document; nothing is stored partially.
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    /// An embedding vector's length disagrees with the store's configured
    /// dimensionality. Never silently truncated or padded.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Required metadata is missing or out of range.
    #[error("metadata validation failed: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
