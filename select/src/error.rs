//! Error types for selection operations.
//!
//! This module defines `SelectError`, the error type of selector resolution,
//! trial materialization and trial derivation. Failures of the data layer are
//! wrapped unchanged in [`SelectError::Data`].

use ephys_data::DataError;
use std::error::Error as StdError;
use thiserror::Error;

/// Custom error type for selection operations.
#[derive(Debug, Error)]
pub enum SelectError {
    /// Selector or argument of the wrong kind for its dimension
    #[error("Wrong type for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Out-of-range selector, empty range, malformed trial specification
    #[error("Invalid value for '{name}': expected {legal}, got {actual}")]
    InvalidValue {
        name: String,
        legal: String,
        actual: String,
    },

    /// Underlying storage is inaccessible
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failures reported by the data layer
    #[error(transparent)]
    Data(#[from] DataError),

    /// Generic error with context (for wrapping other errors)
    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl SelectError {
    /// Create a TypeMismatch error
    pub fn type_mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an InvalidValue error
    pub fn invalid_value(
        name: impl Into<String>,
        legal: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            name: name.into(),
            legal: legal.into(),
            actual: actual.into(),
        }
    }

    /// Whether the error is an `InvalidValue`, here or in the data layer
    #[must_use]
    pub const fn is_invalid_value(&self) -> bool {
        matches!(
            self,
            Self::InvalidValue { .. } | Self::Data(DataError::InvalidValue { .. })
        )
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        match self {
            Self::TypeMismatch {
                name,
                expected,
                actual,
            } => Self::TypeMismatch {
                name: format!("{context}: {name}"),
                expected,
                actual,
            },
            Self::InvalidValue {
                name,
                legal,
                actual,
            } => Self::InvalidValue {
                name: format!("{context}: {name}"),
                legal,
                actual,
            },
            Self::Io(e) => Self::Other {
                message: format!("{context}: {e}"),
                source: Some(Box::new(e)),
            },
            Self::Data(e) => Self::Other {
                message: format!("{context}: {e}"),
                source: Some(Box::new(e)),
            },
            Self::Other { message, source } => Self::Other {
                message: format!("{context}: {message}"),
                source,
            },
        }
    }
}

// Type alias for Result using SelectError
pub type Result<T> = std::result::Result<T, SelectError>;
