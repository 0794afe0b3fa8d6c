use std::collections::HashMap;

use quiver_core::{Cursor, Edge, Metadata, ResultWindow, State};
use quiver_storage::{
    edge_from_row, edge_from_row_at, metadata_from_row, QueryClass, StorageError,
    EDGE_COLUMNS, METADATA_COLUMNS,
};
use rusqlite::{params, params_from_iter, Row};

use crate::paging::{states_in, PagedSelect};
use crate::{Shard, ShardError};

impl Shard {
    /// Point lookup by edge identity.
    pub fn get(&self, source_id: u64, destination_id: u64) -> Result<Option<Edge>, ShardError> {
        self.executor
            .select_one(
                QueryClass::Select,
                &format!(
                    "SELECT {EDGE_COLUMNS} FROM {} WHERE source_id = ?1 AND destination_id = ?2",
                    self.edges_table()
                ),
                params![source_id as i64, destination_id as i64],
                edge_from_row,
            )
            .map_err(|e| self.tag(e))
    }

    /// Number of edges attributed to the source, summed over the requested
    /// states. The stored count only tracks the metadata state, so states
    /// other than it contribute zero. A missing row is materialized and the
    /// read retried.
    pub fn count(&self, source_id: u64, states: &[State]) -> Result<i32, ShardError> {
        let select = format!(
            "SELECT {METADATA_COLUMNS} FROM {} WHERE source_id = ?1",
            self.metadata_table()
        );
        for _ in 0..2 {
            let row = self
                .executor
                .select_one(
                    QueryClass::Select,
                    &select,
                    params![source_id as i64],
                    metadata_from_row,
                )
                .map_err(|e| self.tag(e))?;
            match row {
                Some(metadata) => {
                    return Ok(states
                        .iter()
                        .map(|state| {
                            if *state == metadata.state {
                                metadata.count
                            } else {
                                0
                            }
                        })
                        .sum());
                }
                None => self.populate_metadata(source_id).map_err(|e| self.tag(e))?,
            }
        }
        Err(self.tag(StorageError::MissingMetadata { source_id }))
    }

    /// Batch count lookup. Sources without a metadata row are left absent
    /// from the result map.
    pub fn counts(
        &self,
        source_ids: &[u64],
        results: &mut HashMap<u64, i32>,
    ) -> Result<(), ShardError> {
        if source_ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; source_ids.len()].join(", ");
        let sql = format!(
            "SELECT {METADATA_COLUMNS} FROM {} WHERE source_id IN ({placeholders})",
            self.metadata_table()
        );
        let rows = self
            .executor
            .select(
                QueryClass::Select,
                &sql,
                params_from_iter(source_ids.iter().map(|id| *id as i64)),
                metadata_from_row,
            )
            .map_err(|e| self.tag(e))?;
        for metadata in rows {
            results.insert(metadata.source_id, metadata.count);
        }
        Ok(())
    }

    /// Full metadata scan for copy, ascending by source id. Returns the page
    /// and the continuation cursor (`End` when the scan is complete).
    pub fn select_all_metadata(
        &self,
        cursor: Cursor,
        count: usize,
    ) -> Result<(Vec<Metadata>, Cursor), ShardError> {
        if cursor.is_end() {
            return Ok((Vec::new(), Cursor::End));
        }
        let limit = count + 1;
        let mut rows = match cursor {
            Cursor::Start => self.executor.select(
                QueryClass::SelectCopy,
                &format!(
                    "SELECT {METADATA_COLUMNS} FROM {} ORDER BY source_id ASC LIMIT {limit}",
                    self.metadata_table()
                ),
                [],
                metadata_from_row,
            ),
            other => self.executor.select(
                QueryClass::SelectCopy,
                &format!(
                    "SELECT {METADATA_COLUMNS} FROM {} WHERE source_id > ?1 \
                     ORDER BY source_id ASC LIMIT {limit}",
                    self.metadata_table()
                ),
                params![other.magnitude()],
                metadata_from_row,
            ),
        }
        .map_err(|e| self.tag(e))?;

        let next = if rows.len() > count {
            rows.truncate(count);
            match rows.last() {
                Some(metadata) => Cursor::Forward(metadata.source_id as i64),
                None => Cursor::End,
            }
        } else {
            Cursor::End
        };
        Ok((rows, next))
    }

    /// Full edge scan for copy, ordered `(source_id, destination_id)`
    /// ascending and anchored strictly past `cursor`. Returns the page and
    /// the continuation pair (`None` when the scan is complete).
    #[allow(clippy::type_complexity)]
    pub fn select_all(
        &self,
        cursor: (u64, u64),
        count: usize,
    ) -> Result<(Vec<Edge>, Option<(u64, u64)>), ShardError> {
        let limit = count + 1;
        let mut rows = self
            .executor
            .select(
                QueryClass::SelectCopy,
                &format!(
                    "SELECT {EDGE_COLUMNS} FROM {} \
                     WHERE (source_id = ?1 AND destination_id > ?2) OR source_id > ?1 \
                     ORDER BY source_id ASC, destination_id ASC LIMIT {limit}",
                    self.edges_table()
                ),
                params![cursor.0 as i64, cursor.1 as i64],
                edge_from_row,
            )
            .map_err(|e| self.tag(e))?;

        let next = if rows.len() > count {
            rows.truncate(count);
            rows.last().map(|edge| (edge.source_id, edge.destination_id))
        } else {
            None
        };
        Ok((rows, next))
    }

    /// Destination ids for the source in the given states, paginated by
    /// destination id.
    pub fn select_by_destination_id(
        &self,
        source_id: u64,
        states: &[State],
        count: usize,
        cursor: Cursor,
    ) -> Result<ResultWindow<u64>, ShardError> {
        if states.is_empty() {
            return Ok(ResultWindow::empty());
        }
        let query = PagedSelect {
            table: self.edges_table(),
            columns: "destination_id",
            conditions: format!("source_id = ?1 AND {}", states_in(states)),
            cursor_column: "destination_id",
            index: Some(self.dest_index()),
        };
        self.paged(&query, source_id, cursor, count, destination_row)
            .map_err(|e| self.tag(e))
    }

    /// Destination ids for the source in the given states, paginated by the
    /// client-supplied position.
    pub fn select_by_position(
        &self,
        source_id: u64,
        states: &[State],
        count: usize,
        cursor: Cursor,
    ) -> Result<ResultWindow<u64>, ShardError> {
        if states.is_empty() {
            return Ok(ResultWindow::empty());
        }
        let query = PagedSelect {
            table: self.edges_table(),
            columns: "destination_id, position",
            conditions: format!("source_id = ?1 AND {}", states_in(states)),
            cursor_column: "position",
            index: None,
        };
        self.paged(&query, source_id, cursor, count, |row| {
            let destination: i64 = row.get(1)?;
            let position: i64 = row.get(2)?;
            Ok((destination as u64, position))
        })
        .map_err(|e| self.tag(e))
    }

    /// Destination ids in every state except `Removed`, paginated by
    /// destination id.
    pub fn select_including_archived(
        &self,
        source_id: u64,
        count: usize,
        cursor: Cursor,
    ) -> Result<ResultWindow<u64>, ShardError> {
        let query = PagedSelect {
            table: self.edges_table(),
            columns: "destination_id",
            conditions: format!("source_id = ?1 AND state != {}", State::Removed.id()),
            cursor_column: "destination_id",
            index: Some(self.dest_index()),
        };
        self.paged(&query, source_id, cursor, count, destination_row)
            .map_err(|e| self.tag(e))
    }

    /// Like [`select_by_position`] but returning full edge rows.
    pub fn select_edges(
        &self,
        source_id: u64,
        states: &[State],
        count: usize,
        cursor: Cursor,
    ) -> Result<ResultWindow<Edge>, ShardError> {
        if states.is_empty() {
            return Ok(ResultWindow::empty());
        }
        let query = PagedSelect {
            table: self.edges_table(),
            columns: EDGE_COLUMNS,
            conditions: format!("source_id = ?1 AND {}", states_in(states)),
            cursor_column: "position",
            index: None,
        };
        self.paged(&query, source_id, cursor, count, |row| {
            let edge = edge_from_row_at(row, 1)?;
            Ok((edge, edge.position))
        })
        .map_err(|e| self.tag(e))
    }

    /// Destination ids among `destination_ids` that the source holds in one
    /// of the given states, descending. Empty input short-circuits.
    pub fn intersect(
        &self,
        source_id: u64,
        states: &[State],
        destination_ids: &[u64],
    ) -> Result<Vec<u64>, ShardError> {
        if states.is_empty() || destination_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT destination_id FROM {} WHERE source_id = ? AND {} \
             AND destination_id IN ({}) ORDER BY destination_id DESC",
            self.edges_table(),
            states_in(states),
            vec!["?"; destination_ids.len()].join(", ")
        );
        self.executor
            .select(
                QueryClass::Select,
                &sql,
                params_from_iter(
                    std::iter::once(source_id as i64)
                        .chain(destination_ids.iter().map(|id| *id as i64)),
                ),
                |row| row.get::<_, i64>(0).map(|id| id as u64),
            )
            .map_err(|e| self.tag(e))
    }

    /// Like [`intersect`] but returning full edge rows.
    pub fn intersect_edges(
        &self,
        source_id: u64,
        states: &[State],
        destination_ids: &[u64],
    ) -> Result<Vec<Edge>, ShardError> {
        if states.is_empty() || destination_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {EDGE_COLUMNS} FROM {} WHERE source_id = ? AND {} \
             AND destination_id IN ({}) ORDER BY destination_id DESC",
            self.edges_table(),
            states_in(states),
            vec!["?"; destination_ids.len()].join(", ")
        );
        self.executor
            .select(
                QueryClass::Select,
                &sql,
                params_from_iter(
                    std::iter::once(source_id as i64)
                        .chain(destination_ids.iter().map(|id| *id as i64)),
                ),
                edge_from_row,
            )
            .map_err(|e| self.tag(e))
    }

    /// Run one page-plus-probe statement and assemble the window. `map`
    /// decodes a row starting past the discriminator column into an item and
    /// its cursor position.
    fn paged<T, F>(
        &self,
        query: &PagedSelect,
        source_id: u64,
        cursor: Cursor,
        count: usize,
        mut map: F,
    ) -> Result<ResultWindow<T>, StorageError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<(T, i64)>,
    {
        if cursor.is_end() {
            return Ok(ResultWindow::empty());
        }
        let sql = query.sql(cursor, count);
        let rows = self.executor.select(
            QueryClass::Select,
            &sql,
            params![source_id as i64, cursor.magnitude()],
            |row| {
                let part: i64 = row.get(0)?;
                let (item, position) = map(row)?;
                Ok((part, item, position))
            },
        )?;

        let mut page_rows = Vec::with_capacity(rows.len());
        let mut saw_probe = false;
        for (part, item, position) in rows {
            if part == 0 {
                page_rows.push((item, position));
            } else {
                saw_probe = true;
            }
        }
        // union output order is not contractual; restore the query direction
        if matches!(cursor, Cursor::Backward(_)) {
            page_rows.sort_unstable_by_key(|(_, position)| *position);
        } else {
            page_rows.sort_unstable_by_key(|(_, position)| std::cmp::Reverse(*position));
        }
        Ok(ResultWindow::build(cursor, count, page_rows, saw_probe))
    }
}

fn destination_row(row: &Row<'_>) -> rusqlite::Result<(u64, i64)> {
    let destination: i64 = row.get(1)?;
    Ok((destination as u64, destination))
}
