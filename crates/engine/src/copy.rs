use std::sync::atomic::Ordering;
use std::time::Instant;

use quiver_core::{Edge, Metadata};
use quiver_storage::{StorageError, Txn};
use rusqlite::params;
use tracing::{debug, warn};

use crate::{Shard, ShardError};

impl Shard {
    /// Bulk-ingest edges from a copy stream. The input is grouped
    /// contiguously by source (caller-guaranteed); each same-source burst
    /// runs under one metadata transaction: a multi-row insert first, and a
    /// per-row fallback through the single-edge path for whatever the batch
    /// rejected. Partial success is expected and reflected in the count.
    pub fn write_copies(&self, edges: &[Edge]) -> Result<(), ShardError> {
        let mut rest = edges;
        while let Some(head) = rest.first() {
            let source_id = head.source_id;
            let split = rest
                .iter()
                .position(|edge| edge.source_id != source_id)
                .unwrap_or(rest.len());
            let (burst, tail) = rest.split_at(split);
            self.write_burst_with_retries(source_id, burst)?;
            rest = tail;
        }
        Ok(())
    }

    fn write_burst_with_retries(&self, source_id: u64, burst: &[Edge]) -> Result<(), ShardError> {
        let mut remaining = self.deadlock_retries.max(1);
        loop {
            let started = Instant::now();
            let result =
                self.atomically(source_id, |txn, metadata| self.write_burst(txn, metadata, burst));
            match result {
                Ok(()) => {
                    self.stats.copy_bursts.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        source_id,
                        rows = burst.len(),
                        elapsed_us = started.elapsed().as_micros() as u64,
                        "copy burst"
                    );
                    return Ok(());
                }
                Err(e) if e.is_deadlock() && remaining > 1 => {
                    remaining -= 1;
                    self.stats.deadlock_retries.fetch_add(1, Ordering::Relaxed);
                    debug!(source_id, remaining, "deadlock, retrying copy burst");
                }
                Err(e) => return Err(self.tag(e)),
            }
        }
    }

    fn write_burst(
        &self,
        txn: &Txn<'_>,
        metadata: &Metadata,
        burst: &[Edge],
    ) -> Result<(), StorageError> {
        let insert = format!(
            "INSERT INTO {} (source_id, position, updated_at, destination_id, count, state) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            self.edges_table()
        );
        let rows: Vec<(i64, i64, i64, i64, i64, i64)> = burst
            .iter()
            .map(|edge| {
                (
                    edge.source_id as i64,
                    edge.position,
                    edge.updated_at as i64,
                    edge.destination_id as i64,
                    edge.count as i64,
                    edge.state.id(),
                )
            })
            .collect();

        let mut delta: i64 = 0;
        match txn.execute_batch(&insert, rows) {
            Ok(_statuses) => {
                delta = burst
                    .iter()
                    .filter(|edge| edge.state == metadata.state)
                    .count() as i64;
            }
            Err(StorageError::Batch { statuses }) => {
                self.stats.copy_fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!(
                    source_id = metadata.source_id,
                    failed = statuses.iter().filter(|status| **status < 0).count(),
                    rows = burst.len(),
                    "copy batch fell back to per-row writes"
                );
                for (edge, status) in burst.iter().zip(&statuses) {
                    if *status < 0 {
                        delta += self.write_edge(txn, metadata, edge, false)?;
                    } else if edge.state == metadata.state {
                        delta += 1;
                    }
                }
            }
            Err(e) => return Err(e),
        }

        if delta != 0 {
            // copy totals are non-negative by construction; no clamp here
            txn.execute(
                &format!(
                    "UPDATE {} SET count = count + ?1 WHERE source_id = ?2",
                    self.metadata_table()
                ),
                params![delta, metadata.source_id as i64],
            )?;
        }
        Ok(())
    }
}
