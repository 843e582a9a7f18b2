//! Error types for the hybrid memory manager

use thiserror::Error;

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {

    // =============================
    // Collaborator Errors
    // =============================

    /// Network error, non-success status, malformed response or timeout
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("Answer generation failed: {0}")]
    AnswerGenerationFailed(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Vector index error: {0}")]
    IndexFailed(String),

    // =============================
    // Contract Violations
    // =============================

    #[error("Memory id already indexed: {0}")]
    DuplicateMemoryId(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MemoryError {
    /// True for failures raised at a collaborator boundary
    pub fn is_transport(&self) -> bool {
        matches!(self, MemoryError::Transport(_) | MemoryError::HttpError(_))
    }
}
