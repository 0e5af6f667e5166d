//! Custom error types for audit-trail
//!
//! This module defines the error hierarchy for the audit engine using thiserror
//! for ergonomic error definitions.

use thiserror::Error;

use crate::models::AuditRecordId;

/// The main error type for audit-trail operations
#[derive(Error, Debug)]
pub enum AuditError {
    /// Entity not set up for auditing, record not persisted, unknown type
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The current value of a field no longer matches what the audit record expects
    #[error("New value does not match current, risky to undo: field '{field}' expected {expected}, found {current}")]
    Integrity {
        field: String,
        expected: String,
        current: String,
    },

    /// A diff value cannot be rendered to a storable string form
    #[error("Unable to typecast value for storing: field '{field}' ({from} -> {to})")]
    Serialization {
        field: String,
        from: String,
        to: String,
    },

    /// pull() without a matching push()
    #[error("Audit stack underflow: pull() called without a matching push()")]
    StackUnderflow,

    /// The audit record was already reverted
    #[error("Audit record {0} has already been reverted")]
    AlreadyReverted(AuditRecordId),

    /// No undo handler is registered for the action
    #[error("No undo handler registered for action '{0}'")]
    UnsupportedAction(String),

    /// Entity or record not found
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    /// Validation errors for field values and record fields
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Export errors
    #[error("Export error: {0}")]
    Export(String),
}

impl AuditError {
    /// Create a "not found" error for audit records
    pub fn record_not_found(id: AuditRecordId) -> Self {
        Self::NotFound {
            entity_type: "Audit record".to_string(),
            identifier: id.to_string(),
        }
    }

    /// Create a "not found" error for a host entity
    pub fn entity_not_found(entity_type: impl Into<String>, identifier: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            identifier: identifier.to_string(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an integrity error raised by undo
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for audit-trail operations
pub type AuditResult<T> = Result<T, AuditError>;
