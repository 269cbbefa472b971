//! Configuration errors.

use thiserror::Error;

/// Result type for configuration loading and validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Json(String),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("Unknown column type '{type_name}' for {field}")]
    UnknownType { field: String, type_name: String },
}

impl ConfigError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ConfigError::Io(_) => 70,
            ConfigError::Json(_) => 71,
            ConfigError::Invalid { .. } => 72,
            ConfigError::VersionMismatch { .. } => 73,
            ConfigError::UnknownType { .. } => 74,
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}
