use thiserror::Error;

/// Backend errors, classified into the kinds the write paths branch on.
/// `Integrity` and `Deadlock` are recoverable (position perturbation and
/// bounded retry respectively); everything else propagates.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("integrity violation: {0}")]
    Integrity(rusqlite::Error),

    #[error("deadlock: {0}")]
    Deadlock(rusqlite::Error),

    #[error("query timeout: {0}")]
    Timeout(rusqlite::Error),

    #[error("batch execution failed ({} rows)", .statuses.len())]
    Batch { statuses: Vec<i64> },

    #[error("no metadata row for source {source_id}")]
    MissingMetadata { source_id: u64 },

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
}

impl StorageError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, StorageError::Integrity(_))
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self, StorageError::Deadlock(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StorageError::Timeout(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                rusqlite::ErrorCode::ConstraintViolation => StorageError::Integrity(error),
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    StorageError::Deadlock(error)
                }
                rusqlite::ErrorCode::OperationInterrupted => StorageError::Timeout(error),
                _ => StorageError::Sqlite(error),
            },
            _ => StorageError::Sqlite(error),
        }
    }
}
