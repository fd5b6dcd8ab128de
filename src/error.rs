// src/error.rs
//
// Library error type. The binary wraps these in anyhow with context.

use std::path::PathBuf;

/// Errors produced by the risk engine.
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("validation error in '{field}': {message}")]
    Validation { field: String, message: String },

    /// Raised when the Cholesky factorisation of a correlation matrix fails.
    #[error("{dim}x{dim} correlation matrix is not positive definite")]
    NotPositiveDefinite { dim: usize },

    #[error("unknown location: {0}")]
    UnknownLocation(String),
}

impl RiskError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RiskError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        RiskError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;
