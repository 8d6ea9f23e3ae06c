//! Error types for Vitrine operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all Vitrine crates. Uses `thiserror` for derive macros.
//!
//! # Taxonomy
//!
//! | Variant | Raised when | Caller expectation |
//! |---------|-------------|--------------------|
//! | `Validation` | A record breaks a dimensionality/shape invariant | Nothing was written |
//! | `InvalidArgument` | Call parameters are unusable (`k < 1`, no query) | No I/O happened |
//! | `Provider` | Embedding generation failed | Fatal unless degraded mode |
//! | `Timeout` | An external call exceeded its deadline | Per-modality, recoverable |
//! | `NotFound` | A lookup named an unknown id | Informational |
//! | `Backend` | The underlying store failed | Retried within a bounded budget |

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in Vitrine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed record: wrong dimensionality, no embeddings at all.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad call parameters.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Embedding generation failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// An external call exceeded its deadline.
    #[error("Timed out after {after:?}: {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// Lookup of an unknown id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying store unavailable or inconsistent.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a provider error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an I/O error annotated with the path involved.
    pub fn io_with_path(err: std::io::Error, path: impl AsRef<std::path::Path>) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {err}", path.as_ref().display()),
        ))
    }

    /// Whether a retry of the same call may succeed.
    ///
    /// Only store failures qualify. Validation and argument errors are
    /// deterministic, and provider/timeout failures are handled by the
    /// degraded-mode policy instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    /// Whether a failure of one query modality may be tolerated when the
    /// caller asked for degraded single-modality search.
    pub fn is_modality_recoverable(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using Vitrine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
