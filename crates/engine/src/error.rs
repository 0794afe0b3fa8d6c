use quiver_storage::StorageError;
use thiserror::Error;

/// Errors crossing the shard boundary. Recoverable backend conditions
/// (integrity violations, deadlocks) are consumed by the writer's retry
/// loops; whatever escapes is tagged with the shard identity so callers can
/// tell which physical store failed.
#[derive(Debug, Error)]
pub enum ShardError {
    #[error("shard {shard_id}: query timeout: {source}")]
    Timeout {
        shard_id: String,
        #[source]
        source: StorageError,
    },

    #[error("shard {shard_id}: {source}")]
    Storage {
        shard_id: String,
        #[source]
        source: StorageError,
    },
}

impl ShardError {
    pub fn from_storage(shard_id: String, source: StorageError) -> Self {
        if source.is_timeout() {
            ShardError::Timeout { shard_id, source }
        } else {
            ShardError::Storage { shard_id, source }
        }
    }

    pub fn shard_id(&self) -> &str {
        match self {
            ShardError::Timeout { shard_id, .. } | ShardError::Storage { shard_id, .. } => shard_id,
        }
    }

    pub fn storage(&self) -> &StorageError {
        match self {
            ShardError::Timeout { source, .. } | ShardError::Storage { source, .. } => source,
        }
    }
}
