//! Error types for export sinks.

use roost_core::{HookEvent, StoreError};
use thiserror::Error;

pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Errors from sink construction and writes.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{sink} sink cannot be registered on {event}")]
    Trigger { sink: String, event: HookEvent },

    #[error("sink lock poisoned")]
    LockPoisoned,

    #[error("writer not initialized")]
    NotInitialized,
}

impl SinkError {
    /// Returns the error code for this error type.
    pub fn code(&self) -> u32 {
        match self {
            SinkError::Io(_) => 80,
            SinkError::Parquet(_) => 81,
            SinkError::Arrow(_) => 82,
            SinkError::Json(_) => 83,
            SinkError::Store(e) => e.code(),
            SinkError::Trigger { .. } => 84,
            SinkError::LockPoisoned => 85,
            SinkError::NotInitialized => 86,
        }
    }
}
