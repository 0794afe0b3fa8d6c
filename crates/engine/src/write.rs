use std::sync::atomic::Ordering;

use quiver_core::{Edge, Metadata, State};
use quiver_storage::{edge_from_row, QueryClass, StorageError, Txn, EDGE_COLUMNS};
use rand::Rng;
use rusqlite::params;
use tracing::debug;

use crate::{Shard, ShardError};

impl Shard {
    /// Write one edge with last-writer-wins semantics: newer `updated_at`
    /// always wins, ties go to the higher-precedence state. Deadlocks are
    /// retried with identical arguments, integrity violations with a bumped
    /// position, both bounded by the configured retry budget.
    pub fn write(&self, edge: Edge) -> Result<(), ShardError> {
        self.write_with_tries(edge, self.deadlock_retries)
    }

    fn write_with_tries(&self, mut edge: Edge, tries: u32) -> Result<(), ShardError> {
        let mut remaining = tries.max(1);
        loop {
            let result = self.atomically(edge.source_id, |txn, metadata| {
                let delta = self.write_edge(txn, metadata, &edge, true)?;
                self.apply_count_delta(txn, edge.source_id, delta)
            });
            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_deadlock() && remaining > 1 => {
                    remaining -= 1;
                    self.stats.deadlock_retries.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        source_id = edge.source_id,
                        destination_id = edge.destination_id,
                        remaining,
                        "deadlock, retrying write"
                    );
                }
                Err(e) if e.is_integrity() && remaining > 1 => {
                    remaining -= 1;
                    self.stats.position_retries.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        source_id = edge.source_id,
                        position = edge.position,
                        "position collision, retrying with bumped position"
                    );
                    edge.position += 1;
                }
                Err(e) => return Err(self.tag(e)),
            }
        }
    }

    /// Fold a count delta into the metadata row, clamped at zero.
    pub(crate) fn apply_count_delta(
        &self,
        txn: &Txn<'_>,
        source_id: u64,
        delta: i64,
    ) -> Result<(), StorageError> {
        if delta != 0 {
            txn.execute(
                &format!(
                    "UPDATE {} SET count = MAX(count + ?1, 0) WHERE source_id = ?2",
                    self.metadata_table()
                ),
                params![delta, source_id as i64],
            )?;
        }
        Ok(())
    }

    /// Insert-or-update one edge inside a held metadata transaction and
    /// return the count delta: +1 when the write moves a row into the set
    /// counted by the metadata state, -1 when it moves one out, 0 otherwise.
    ///
    /// `predict_existence` reads the row first and picks the path; the copy
    /// path passes `false` to insert optimistically and fall back to the
    /// update on a key collision.
    pub(crate) fn write_edge(
        &self,
        txn: &Txn<'_>,
        metadata: &Metadata,
        edge: &Edge,
        predict_existence: bool,
    ) -> Result<i64, StorageError> {
        let applied = if predict_existence {
            match self.edge_in_txn(txn, edge.source_id, edge.destination_id)? {
                Some(old) => self.update_edge(txn, metadata, &old, edge)?,
                None => self.insert_edge(txn, metadata, edge)?,
            }
        } else {
            match self.insert_edge(txn, metadata, edge) {
                Ok(applied) => applied,
                Err(e) if e.is_integrity() => {
                    match self.edge_in_txn(txn, edge.source_id, edge.destination_id)? {
                        Some(old) => self.update_edge(txn, metadata, &old, edge)?,
                        None => 0,
                    }
                }
                Err(e) => return Err(e),
            }
        };
        Ok(if edge.state == metadata.state {
            applied
        } else {
            -applied
        })
    }

    fn edge_in_txn(
        &self,
        txn: &Txn<'_>,
        source_id: u64,
        destination_id: u64,
    ) -> Result<Option<Edge>, StorageError> {
        txn.select_one(
            QueryClass::SelectModify,
            &format!(
                "SELECT {EDGE_COLUMNS} FROM {} WHERE source_id = ?1 AND destination_id = ?2",
                self.edges_table()
            ),
            params![source_id as i64, destination_id as i64],
            edge_from_row,
        )
    }

    fn insert_edge(
        &self,
        txn: &Txn<'_>,
        metadata: &Metadata,
        edge: &Edge,
    ) -> Result<i64, StorageError> {
        txn.execute(
            &format!(
                "INSERT INTO {} (source_id, position, updated_at, destination_id, count, state) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.edges_table()
            ),
            params![
                edge.source_id as i64,
                edge.position,
                edge.updated_at as i64,
                edge.destination_id as i64,
                edge.count as i64,
                edge.state.id()
            ],
        )?;
        // an edge only counts while its state matches the source's state
        Ok(if edge.state == metadata.state { 1 } else { 0 })
    }

    /// Apply `new` over the existing row `old`. A replayed timestamp with a
    /// lower-precedence state is rejected outright; anything else goes
    /// through a `updated_at`-guarded update, so stale writes fall out as
    /// zero updated rows.
    fn update_edge(
        &self,
        txn: &Txn<'_>,
        metadata: &Metadata,
        old: &Edge,
        new: &Edge,
    ) -> Result<i64, StorageError> {
        if old.updated_at == new.updated_at && old.state.max(new.state) != new.state {
            return Ok(0);
        }

        let replace_position = format!(
            "UPDATE {} SET updated_at = ?1, position = ?2, count = 0, state = ?3 \
             WHERE source_id = ?4 AND destination_id = ?5 AND updated_at <= ?1",
            self.edges_table()
        );
        let updated = if new.state == State::Normal {
            // a (re)activated edge surfaces at its new position
            txn.execute(
                &replace_position,
                params![
                    new.updated_at as i64,
                    new.position,
                    new.state.id(),
                    new.source_id as i64,
                    new.destination_id as i64
                ],
            )?
        } else {
            let keep_position = format!(
                "UPDATE {} SET updated_at = ?1, count = 0, state = ?2 \
                 WHERE source_id = ?3 AND destination_id = ?4 AND updated_at <= ?1",
                self.edges_table()
            );
            let result = txn.execute(
                &keep_position,
                params![
                    new.updated_at as i64,
                    new.state.id(),
                    new.source_id as i64,
                    new.destination_id as i64
                ],
            );
            match result {
                Ok(updated) => updated,
                Err(e) if e.is_integrity() => {
                    // the (source_id, state, position) slot is taken; nudge
                    // the kept position off the collision
                    // TODO: allocate positions instead of perturbing
                    // caller-supplied ones
                    let offset: i64 = rand::thread_rng().gen_range(1..1000);
                    self.stats.position_retries.fetch_add(1, Ordering::Relaxed);
                    txn.execute(
                        &replace_position,
                        params![
                            new.updated_at as i64,
                            old.position + offset,
                            new.state.id(),
                            new.source_id as i64,
                            new.destination_id as i64
                        ],
                    )?
                }
                Err(e) => return Err(e),
            }
        };

        // a count changes only when the row crosses the metadata-state
        // boundary
        Ok(
            if new.state != old.state
                && (old.state == metadata.state || new.state == metadata.state)
            {
                updated as i64
            } else {
                0
            },
        )
    }
}
