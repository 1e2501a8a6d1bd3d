//! Error types for the data layer.
//!
//! `DataError` covers everything that can go wrong while opening, reading or
//! allocating disk-backed arrays and while validating trial definitions and
//! datasets. It uses `thiserror` for convenient error construction.

use thiserror::Error;

/// Custom error type for data-layer operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// An argument of the wrong kind was supplied
    #[error("Wrong type for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// A value outside of its legal range
    #[error("Invalid value for '{name}': expected {legal}, got {actual}")]
    InvalidValue {
        name: String,
        legal: String,
        actual: String,
    },

    /// Array segments or blocks whose extents do not agree
    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    /// Operations a read-only array does not support
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Underlying storage is inaccessible
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container sidecar (de)serialization failures
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DataError {
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

    /// Create a ShapeMismatch error with a message
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    /// Create an Unsupported error naming the rejected operation
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }
}

// Type alias for Result using DataError
pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message() {
        let error = DataError::invalid_value("trialdefinition", "3+ columns", "2 columns");
        assert!(matches!(error, DataError::InvalidValue { .. }));
        assert!(error.to_string().contains("trialdefinition"));
        assert!(error.to_string().contains("3+ columns"));
    }

    #[test]
    fn test_unsupported_message() {
        let error = DataError::unsupported("write to virtual array");
        assert!(error.to_string().contains("Unsupported operation"));
        assert!(error.to_string().contains("virtual array"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let error: DataError = io.into();
        assert!(matches!(error, DataError::Io(_)));
    }
}
