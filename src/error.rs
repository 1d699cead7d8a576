//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.
//!
//! The decode path has no per-item recovery: a malformed model shape or an
//! invalid decoder parameter affects every read uniformly, so these errors
//! propagate straight to `main` and terminate the process.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for rorado operations
#[derive(Error, Debug)]
pub enum RoradoError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (invalid beam width, overlap >= chunk size, ...)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid data errors (malformed tensor shape, state count not a power
    /// of four, emission record mismatch)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Algorithm errors (non-finite scores, empty beam)
    #[error("Algorithm error: {message}")]
    Algorithm { message: String },

    /// File not found errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Container parse errors (bad magic, truncated record)
    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Type alias for Results using RoradoError
pub type Result<T> = std::result::Result<T, RoradoError>;

impl RoradoError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create an algorithm error
    pub fn algorithm(message: impl Into<String>) -> Self {
        Self::Algorithm {
            message: message.into(),
        }
    }

    /// Create a parse error for a container file
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RoradoError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidData {
            message: err.to_string(),
        }
    }
}
