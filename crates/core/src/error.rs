//! Error types for the MedRAG pipeline.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! prompt assembly, the vector store, the embedding service and the
//! generation service.

use std::fmt;
use thiserror::Error;

/// Whether a failed generation call may succeed if repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// Network failures, timeouts, rate limiting, 5xx responses.
    Transient,

    /// Authentication, invalid requests, malformed responses.
    Terminal,
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Terminal => f.write_str("terminal"),
        }
    }
}

/// Unified error type for the MedRAG workspace.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Prompt template errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Empty question, out-of-range parameters, malformed input records
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Index or metadata missing, corrupt or built with another embedding setup
    #[error("Store load error: {0}")]
    StoreLoad(String),

    /// Embedding call failed or returned a vector of the wrong dimension
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The retriever has no loaded store to search
    #[error("Retriever unavailable: {0}")]
    RetrieverUnavailable(String),

    /// Generation service failure
    #[error("Generation error ({kind}): {message}")]
    Generation {
        kind: GenerationErrorKind,
        message: String,
    },

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Build a retryable generation error.
    pub fn transient(message: impl Into<String>) -> Self {
        AppError::Generation {
            kind: GenerationErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Build a non-retryable generation error.
    pub fn terminal(message: impl Into<String>) -> Self {
        AppError::Generation {
            kind: GenerationErrorKind::Terminal,
            message: message.into(),
        }
    }

    /// True only for transient generation errors.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Generation {
                kind: GenerationErrorKind::Transient,
                ..
            }
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_marker() {
        assert!(AppError::transient("connection reset").is_retryable());
        assert!(!AppError::terminal("401 unauthorized").is_retryable());
        assert!(!AppError::Embedding("boom".to_string()).is_retryable());
    }

    #[test]
    fn test_generation_display_carries_kind() {
        let err = AppError::terminal("invalid API key");
        assert_eq!(
            err.to_string(),
            "Generation error (terminal): invalid API key"
        );
    }
}
