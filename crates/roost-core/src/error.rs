//! Error types for the roost pipeline.

use arrow::error::ArrowError;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for staging, batching, reconciliation and views.
#[derive(Error, Debug)]
pub enum StoreError {
    // Type errors (10-19)
    #[error("no common supertype{} among [{types}]", describe_field(.field))]
    TypeMismatch { field: Option<String>, types: String },

    #[error("cannot cast column '{field}' from {from} to {to}: {reason}")]
    Cast {
        field: String,
        from: String,
        to: String,
        reason: String,
    },

    // Query errors (20-29)
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    // Input errors (30-39)
    #[error("unknown source key: {0}")]
    UnknownKey(String),

    #[error("field name '{0}' is reserved")]
    ReservedField(String),

    // Capability errors (40-49)
    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("unsupported column type: {0}")]
    UnsupportedType(String),

    // Internal errors (50-69)
    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

fn describe_field(field: &Option<String>) -> String {
    match field {
        Some(name) => format!(" for field '{}'", name),
        None => String::new(),
    }
}

impl StoreError {
    /// Returns the error code for this error type.
    /// Used for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            StoreError::TypeMismatch { .. } => 10,
            StoreError::Cast { .. } => 11,
            StoreError::InvalidSelector(_) => 20,
            StoreError::UnknownKey(_) => 30,
            StoreError::ReservedField(_) => 31,
            StoreError::NotImplemented(_) => 40,
            StoreError::UnsupportedType(_) => 41,
            StoreError::LockPoisoned => 50,
            StoreError::Arrow(_) => 60,
        }
    }

    /// Attach a field name to a type mismatch raised without one.
    pub(crate) fn for_field(self, name: &str) -> Self {
        match self {
            StoreError::TypeMismatch { field: None, types } => StoreError::TypeMismatch {
                field: Some(name.to_string()),
                types,
            },
            other => other,
        }
    }
}
