//! Core error types for Documents RS
//!
//! Every crate has its own error enum; they all convert into [`DmError`]
//! at the boundary where a caller needs a single, HTTP-mappable error.

use thiserror::Error;

/// Core error type shared across the workspace
#[derive(Error, Debug)]
pub enum DmError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DmError {
    pub fn not_found(entity: &'static str, field: &'static str, value: impl ToString) -> Self {
        Self::NotFound {
            entity,
            field,
            value: value.to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// HTTP status code mapping for errors
    pub fn status_code(&self) -> u16 {
        match self {
            DmError::NotFound { .. } => 404,
            DmError::Conflict { .. } => 409,
            DmError::Validation { .. } => 422,
            DmError::Queue(_) => 503,
            DmError::Database(_)
            | DmError::Storage(_)
            | DmError::Config(_)
            | DmError::Internal(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            DmError::NotFound { .. } => "not_found",
            DmError::Conflict { .. } => "conflict",
            DmError::Validation { .. } => "validation_failed",
            DmError::Database(_) => "database_error",
            DmError::Storage(_) => "storage_error",
            DmError::Queue(_) => "queue_error",
            DmError::Config(_) => "configuration_error",
            DmError::Internal(_) => "internal_error",
        }
    }

    /// Errors the caller can recover from by changing its input
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(DmError::not_found("Document", "id", 7).status_code(), 404);
        assert_eq!(DmError::conflict("taken").status_code(), 409);
        assert_eq!(DmError::validation("blank").status_code(), 422);
        assert_eq!(DmError::Database("down".into()).status_code(), 500);
    }

    #[test]
    fn test_client_errors() {
        assert!(DmError::conflict("x").is_client_error());
        assert!(!DmError::Internal("x".into()).is_client_error());
    }

    #[test]
    fn test_not_found_message() {
        let err = DmError::not_found("Document", "id", 42);
        assert_eq!(err.to_string(), "Not found: Document with id=42");
        assert_eq!(err.error_code(), "not_found");
    }
}
