//! Error types for the matching engine.
//!
//! Every failure surfaces to the caller as a typed [`EngineError`] carrying
//! the failing stage and the underlying cause. The core performs no retries
//! of its own (the HTTP clients own retry/backoff) and never degrades to a
//! partial result: if either retrieval path fails, the whole query fails.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by the matching engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or invalid input text (empty resume list, empty document).
    #[error("chunking error: {0}")]
    Chunking(String),

    /// The external embedding call failed, timed out, or returned a
    /// mismatched vector count or dimensionality.
    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    /// Writing session artifacts to disk failed.
    #[error("index persist error: {0}")]
    IndexPersist(String),

    /// A session artifact exists but could not be read, parsed, or is
    /// internally inconsistent.
    #[error("index load error: {0}")]
    IndexLoad(String),

    /// No session artifacts exist for the given session id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The external language-model call failed.
    #[error("analysis service error: {0}")]
    AnalysisService(String),
}
