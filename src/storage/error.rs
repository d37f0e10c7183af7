//! Storage layer error types
//!
//! Driver errors are flattened to strings here so that callers never see
//! rusqlite types.

use thiserror::Error;

/// Errors that can occur in the record store
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No record with this id
    #[error("Analysis not found: {0}")]
    NotFound(i64),

    /// Record violates the data model (empty text, score out of range, ...)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Stored data could not be decoded
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// Blocking task was cancelled or panicked
    #[error("Task error: {0}")]
    Task(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::Task(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::NotFound(42);
        assert_eq!(err.to_string(), "Analysis not found: 42");

        let err = StorageError::InvalidRecord("score 2 is outside [0, 1]".to_string());
        assert_eq!(err.to_string(), "Invalid record: score 2 is outside [0, 1]");
    }

    #[test]
    fn test_rusqlite_error_conversion() {
        let err: StorageError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StorageError::Database(_)));
    }
}
