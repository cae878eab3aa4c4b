//! Error types for the Floodgate engine.

use thiserror::Error;

/// Main error type for Floodgate operations.
///
/// A denied request is not an error: it is the `Decision::Denied` variant
/// returned by the engine. Only caller mistakes and infrastructure failures
/// surface here.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Invalid policy or identifier input; nothing was recorded
    #[error("Validation error: {field}: {message}")]
    Validation {
        /// The offending field
        field: &'static str,
        /// What was wrong with it
        message: String,
    },

    /// The event store cannot accept a read or write
    #[error("Event store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FloodgateError {
    /// Build a validation error naming the offending field.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// The field a validation error names, if this is one.
    pub fn invalid_field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(*field),
            _ => None,
        }
    }
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_field() {
        let err = FloodgateError::validation("limit", "limit must be a positive integer");
        assert_eq!(err.invalid_field(), Some("limit"));
        assert_eq!(
            err.to_string(),
            "Validation error: limit: limit must be a positive integer"
        );
    }

    #[test]
    fn test_store_unavailable_display() {
        let err = FloodgateError::StoreUnavailable("disk full".to_string());
        assert_eq!(err.to_string(), "Event store unavailable: disk full");
        assert_eq!(err.invalid_field(), None);
    }
}
