use quiver_core::{Cursor, Edge, State};
use quiver_engine::{Shard, ShardConfig, ShardError};

/// An in-memory shard with the test table prefix, plus a few conveniences
/// the integration phases share.
pub struct TestShard {
    pub shard: Shard,
}

impl TestShard {
    pub fn new() -> Result<Self, ShardError> {
        let config = ShardConfig::new(":memory:", "t");
        Ok(Self {
            shard: Shard::open_in_memory(&config)?,
        })
    }

    /// Open a file-backed shard, for tests that share one store across
    /// threads.
    pub fn at_path(path: &str) -> Result<Self, ShardError> {
        let config = ShardConfig::new(path, "t");
        Ok(Self {
            shard: Shard::open(&config)?,
        })
    }

    pub fn edge(
        source_id: u64,
        destination_id: u64,
        position: i64,
        updated_at: u32,
        state: State,
    ) -> Edge {
        Edge::new(source_id, destination_id, position, updated_at, state)
    }

    /// Follow `next_cursor` from `Start` until `End`, concatenating the
    /// destination-ordered pages. Bails out rather than looping forever if a
    /// cursor fails to make progress.
    pub fn drain_by_destination(
        &self,
        source_id: u64,
        states: &[State],
        page_size: usize,
    ) -> Result<Vec<u64>, ShardError> {
        let mut all = Vec::new();
        let mut cursor = Cursor::Start;
        for _ in 0..1000 {
            let window = self
                .shard
                .select_by_destination_id(source_id, states, page_size, cursor)?;
            all.extend(window.page);
            if window.next_cursor.is_end() {
                return Ok(all);
            }
            cursor = window.next_cursor;
        }
        panic!("pagination failed to terminate after 1000 pages");
    }

    /// As [`drain_by_destination`] but over the position ordering.
    pub fn drain_by_position(
        &self,
        source_id: u64,
        states: &[State],
        page_size: usize,
    ) -> Result<Vec<u64>, ShardError> {
        let mut all = Vec::new();
        let mut cursor = Cursor::Start;
        for _ in 0..1000 {
            let window = self
                .shard
                .select_by_position(source_id, states, page_size, cursor)?;
            all.extend(window.page);
            if window.next_cursor.is_end() {
                return Ok(all);
            }
            cursor = window.next_cursor;
        }
        panic!("pagination failed to terminate after 1000 pages");
    }
}
