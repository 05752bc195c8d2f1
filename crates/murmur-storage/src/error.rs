//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested message was not found.
    #[error("message not found: {0}")]
    NotFound(String),

    /// A message failed validation before being stored.
    #[error("invalid message: {0}")]
    Validation(String),

    /// The underlying database failed.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The backend is unavailable for a reason other than a database error.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Returns true if this error means the record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Returns true if this error was caused by invalid input.
    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation(_))
    }
}
