use quiver_core::{Edge, Metadata, State};
use quiver_storage::{metadata_from_row, QueryClass, StorageError, Txn, EDGE_COLUMNS, METADATA_COLUMNS};
use rusqlite::params;

use crate::{Shard, ShardError};

impl Shard {
    /// Run `f` inside a transaction holding the metadata row for
    /// `source_id`. If the row does not exist yet it is materialized outside
    /// the transaction, seeded with the scanned count of `Normal` edges, and
    /// the whole operation retried; the missing-row sentinel never escapes.
    ///
    /// Deadlocks are not retried here; the writer's outer loop owns that.
    pub(crate) fn atomically<T, F>(&self, source_id: u64, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Txn<'_>, &Metadata) -> Result<T, StorageError>,
    {
        let select = format!(
            "SELECT {METADATA_COLUMNS} FROM {} WHERE source_id = ?1",
            self.metadata_table()
        );
        let mut callback = Some(f);
        loop {
            let attempt = self.executor.transaction(|txn| {
                let metadata = txn
                    .select_one(
                        QueryClass::SelectModify,
                        &select,
                        params![source_id as i64],
                        metadata_from_row,
                    )?
                    .ok_or(StorageError::MissingMetadata { source_id })?;
                let run = callback
                    .take()
                    .ok_or(StorageError::MissingMetadata { source_id })?;
                run(txn, &metadata)
            });
            match attempt {
                Err(StorageError::MissingMetadata { .. }) if callback.is_some() => {
                    self.populate_metadata(source_id)?;
                }
                other => return other,
            }
        }
    }

    /// Materialize the default metadata row for a source that has never been
    /// touched, seeding `count` from the edges already present in `Normal`
    /// state. Losing the insert race to another actor is fine.
    pub(crate) fn populate_metadata(&self, source_id: u64) -> Result<(), StorageError> {
        let count: i64 = self
            .executor
            .select_one(
                QueryClass::Select,
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE source_id = ?1 AND state = ?2",
                    self.edges_table()
                ),
                params![source_id as i64, State::Normal.id()],
                |row| row.get(0),
            )?
            .unwrap_or(0);
        self.executor.execute(
            &format!(
                "INSERT INTO {} (source_id, count, state, updated_at) VALUES (?1, ?2, ?3, 0) \
                 ON CONFLICT(source_id) DO NOTHING",
                self.metadata_table()
            ),
            params![source_id as i64, count, State::Normal.id()],
        )?;
        Ok(())
    }

    /// Move a source's metadata to `state` at `updated_at`, recounting the
    /// edges in the new state. Rejected when it would replay the already
    /// recorded timestamp with a lower-precedence state; the SQL guard
    /// additionally drops stale writes.
    pub fn update_metadata(
        &self,
        source_id: u64,
        state: State,
        updated_at: u32,
    ) -> Result<(), ShardError> {
        self.atomically(source_id, |txn, metadata| {
            if updated_at != metadata.updated_at || metadata.state.max(state) == state {
                self.update_metadata_row(txn, source_id, state, updated_at)?;
            }
            Ok(())
        })
        .map_err(|e| self.tag(e))
    }

    fn update_metadata_row(
        &self,
        txn: &Txn<'_>,
        source_id: u64,
        state: State,
        updated_at: u32,
    ) -> Result<(), StorageError> {
        let count: i64 = txn
            .select_one(
                QueryClass::SelectModify,
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE source_id = ?1 AND state = ?2",
                    self.edges_table()
                ),
                params![source_id as i64, state.id()],
                |row| row.get(0),
            )?
            .unwrap_or(0);
        txn.execute(
            &format!(
                "UPDATE {} SET state = ?1, updated_at = ?2, count = ?3 \
                 WHERE source_id = ?4 AND updated_at <= ?2",
                self.metadata_table()
            ),
            params![state.id(), updated_at as i64, count, source_id as i64],
        )?;
        Ok(())
    }

    /// Store a full metadata row: insert if the source is new, otherwise the
    /// timestamp-guarded update. Used by the copy path to mirror rows from
    /// another shard.
    pub fn write_metadata(&self, metadata: &Metadata) -> Result<(), ShardError> {
        let insert = format!(
            "INSERT INTO {} (source_id, count, state, updated_at) VALUES (?1, ?2, ?3, ?4)",
            self.metadata_table()
        );
        let result = self.executor.execute(
            &insert,
            params![
                metadata.source_id as i64,
                metadata.count,
                metadata.state.id(),
                metadata.updated_at as i64
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_integrity() => self
                .atomically(metadata.source_id, |txn, _current| {
                    txn.execute(
                        &format!(
                            "UPDATE {} SET count = ?1, state = ?2, updated_at = ?3 \
                             WHERE source_id = ?4 AND updated_at <= ?3",
                            self.metadata_table()
                        ),
                        params![
                            metadata.count,
                            metadata.state.id(),
                            metadata.updated_at as i64,
                            metadata.source_id as i64
                        ],
                    )?;
                    Ok(())
                })
                .map_err(|e| self.tag(e)),
            Err(e) => Err(self.tag(e)),
        }
    }

    /// Run several operations on one source under a single metadata lock.
    /// The callback gets a [`LockedShard`] dispatching through the open
    /// transaction; the accumulated count delta is applied once when the
    /// callback returns. The handle must not outlive the callback.
    pub fn with_lock<T, F>(&self, source_id: u64, f: F) -> Result<T, ShardError>
    where
        F: FnOnce(&mut LockedShard<'_>) -> Result<T, StorageError>,
    {
        self.atomically(source_id, |txn, metadata| {
            let mut locked = LockedShard {
                shard: self,
                txn,
                metadata: *metadata,
                delta: 0,
            };
            let value = f(&mut locked)?;
            let delta = locked.delta;
            self.apply_count_delta(txn, source_id, delta)?;
            Ok(value)
        })
        .map_err(|e| self.tag(e))
    }
}

/// The operation surface of a shard bound to an open metadata transaction.
pub struct LockedShard<'a> {
    shard: &'a Shard,
    txn: &'a Txn<'a>,
    metadata: Metadata,
    delta: i64,
}

impl LockedShard<'_> {
    /// The metadata row as read when the lock was taken.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Single-edge write through the held transaction. Count deltas are
    /// folded into one metadata update at the end of the lock scope.
    pub fn write(&mut self, edge: &Edge) -> Result<(), StorageError> {
        let delta = self.shard.write_edge(self.txn, &self.metadata, edge, true)?;
        self.delta += delta;
        Ok(())
    }

    /// Point lookup through the held transaction.
    pub fn get(&self, destination_id: u64) -> Result<Option<Edge>, StorageError> {
        self.txn.select_one(
            QueryClass::SelectModify,
            &format!(
                "SELECT {EDGE_COLUMNS} FROM {} WHERE source_id = ?1 AND destination_id = ?2",
                self.shard.edges_table()
            ),
            params![self.metadata.source_id as i64, destination_id as i64],
            quiver_storage::edge_from_row,
        )
    }
}
