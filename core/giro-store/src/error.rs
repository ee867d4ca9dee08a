//! Error types for the record store.

use thiserror::Error;

/// Store-level errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database is locked by another writer and the busy timeout
    /// elapsed. Retryable.
    #[error("store busy: {0}")]
    Busy(String),

    /// Any other SQLite failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A row exists but cannot be decoded into its record type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// True for errors a caller may retry with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(inner, _)
                if matches!(
                    inner.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Busy(e.to_string())
            }
            _ => Self::Storage(e.to_string()),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
