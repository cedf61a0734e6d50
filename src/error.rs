//! Error types for reliquary

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Active run already exists for mesh: {0}")]
    Conflict(String),

    #[error("No eligible images for mesh: {0}")]
    EmptyInput(String),

    #[error("Invalid run transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Executor timed out after {0}s")]
    Timeout(u64),

    #[error("Identifier allocation exhausted after {attempts} attempts under ({naan}, {shoulder})")]
    UniquenessConflict {
        naan: String,
        shoulder: String,
        attempts: u32,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the caller may retry the failed operation later.
    ///
    /// Conflicts clear once the active run reaches a terminal state;
    /// empty input clears once a moderator approves more images. The
    /// remaining variants are either bugs or permanent failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Conflict(_) | CoreError::EmptyInput(_))
    }
}
