//! Error types for the replay buffer.

use thiserror::Error;

/// Main error type for buffer operations.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

/// Result type for buffer operations.
pub type Result<T> = std::result::Result<T, BufferError>;
