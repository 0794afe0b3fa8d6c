pub mod config;
pub mod copy;
pub mod error;
pub mod metadata;
mod paging;
pub mod read;
pub mod stats;
pub mod write;

pub use config::ShardConfig;
pub use error::ShardError;
pub use metadata::LockedShard;
pub use stats::{ShardStats, StatsSnapshot};

use std::sync::Arc;

use quiver_core::{Edge, State};
use quiver_storage::{Executor, StorageError};

/// One logical shard bound to one physical backing store holding an edge
/// table and a metadata table under a shared prefix. All writes serialize
/// per source through the metadata transaction; reads go straight to the
/// executor.
#[derive(Debug)]
pub struct Shard {
    prefix: String,
    shard_id: String,
    deadlock_retries: u32,
    executor: Arc<Executor>,
    stats: Arc<ShardStats>,
}

impl Shard {
    pub fn open(config: &ShardConfig) -> Result<Self, ShardError> {
        let shard_id = config.shard_id();
        let executor = Executor::open(&config.db_name, &config.table_prefix)
            .map_err(|e| ShardError::from_storage(shard_id, e))?;
        Ok(Self::with_executor(config, Arc::new(executor)))
    }

    pub fn open_in_memory(config: &ShardConfig) -> Result<Self, ShardError> {
        let shard_id = config.shard_id();
        let executor = Executor::open_in_memory(&config.table_prefix)
            .map_err(|e| ShardError::from_storage(shard_id, e))?;
        Ok(Self::with_executor(config, Arc::new(executor)))
    }

    /// Bind a shard to an executor that is already open (and already carries
    /// the schema for `config.table_prefix`).
    pub fn with_executor(config: &ShardConfig, executor: Arc<Executor>) -> Self {
        Self {
            prefix: config.table_prefix.clone(),
            shard_id: config.shard_id(),
            deadlock_retries: config.deadlock_retries,
            executor,
            stats: Arc::new(ShardStats::default()),
        }
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn edges_table(&self) -> String {
        format!("{}_edges", self.prefix)
    }

    pub(crate) fn metadata_table(&self) -> String {
        format!("{}_metadata", self.prefix)
    }

    pub(crate) fn dest_index(&self) -> String {
        format!("{}_edges_source_dest", self.prefix)
    }

    pub(crate) fn tag(&self, error: StorageError) -> ShardError {
        ShardError::from_storage(self.shard_id.clone(), error)
    }

    // Lifecycle wrappers: one edge form and one source form per state.

    pub fn add(
        &self,
        source_id: u64,
        destination_id: u64,
        position: i64,
        updated_at: u32,
    ) -> Result<(), ShardError> {
        self.write(Edge::new(
            source_id,
            destination_id,
            position,
            updated_at,
            State::Normal,
        ))
    }

    pub fn negate(
        &self,
        source_id: u64,
        destination_id: u64,
        position: i64,
        updated_at: u32,
    ) -> Result<(), ShardError> {
        self.write(Edge::new(
            source_id,
            destination_id,
            position,
            updated_at,
            State::Negative,
        ))
    }

    pub fn remove(
        &self,
        source_id: u64,
        destination_id: u64,
        position: i64,
        updated_at: u32,
    ) -> Result<(), ShardError> {
        self.write(Edge::new(
            source_id,
            destination_id,
            position,
            updated_at,
            State::Removed,
        ))
    }

    pub fn archive(
        &self,
        source_id: u64,
        destination_id: u64,
        position: i64,
        updated_at: u32,
    ) -> Result<(), ShardError> {
        self.write(Edge::new(
            source_id,
            destination_id,
            position,
            updated_at,
            State::Archived,
        ))
    }

    pub fn add_source(&self, source_id: u64, updated_at: u32) -> Result<(), ShardError> {
        self.update_metadata(source_id, State::Normal, updated_at)
    }

    pub fn negate_source(&self, source_id: u64, updated_at: u32) -> Result<(), ShardError> {
        self.update_metadata(source_id, State::Negative, updated_at)
    }

    pub fn remove_source(&self, source_id: u64, updated_at: u32) -> Result<(), ShardError> {
        self.update_metadata(source_id, State::Removed, updated_at)
    }

    pub fn archive_source(&self, source_id: u64, updated_at: u32) -> Result<(), ShardError> {
        self.update_metadata(source_id, State::Archived, updated_at)
    }
}
