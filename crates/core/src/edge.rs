use serde::{Deserialize, Serialize};

use crate::State;

/// A directed, labeled edge. Uniquely identified by
/// `(source_id, destination_id)`; `(source_id, state, position)` is also
/// unique across the shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: u64,
    pub destination_id: u64,
    /// Caller-supplied ordering key, typically a timestamp-like integer.
    pub position: i64,
    /// Seconds since epoch of the write that produced this row.
    pub updated_at: u32,
    pub count: u8,
    pub state: State,
}

impl Edge {
    pub fn new(
        source_id: u64,
        destination_id: u64,
        position: i64,
        updated_at: u32,
        state: State,
    ) -> Self {
        Self {
            source_id,
            destination_id,
            position,
            updated_at,
            count: 1,
            state,
        }
    }
}

/// Per-source aggregate row. `count` tracks the number of edges whose state
/// equals the metadata state; `state` is the state attributed to the source
/// as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub source_id: u64,
    pub count: i32,
    pub state: State,
    pub updated_at: u32,
}

impl Metadata {
    /// The row lazily materialized on first reference to a source.
    pub fn default_for(source_id: u64, count: i32) -> Self {
        Self {
            source_id,
            count,
            state: State::Normal,
            updated_at: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_edge_counts_once() {
        let edge = Edge::new(1, 2, 300, 40, State::Normal);
        assert_eq!(edge.count, 1);
        assert_eq!(edge.state, State::Normal);
    }

    #[test]
    fn default_metadata_starts_normal_at_epoch() {
        let metadata = Metadata::default_for(9, 3);
        assert_eq!(metadata.state, State::Normal);
        assert_eq!(metadata.updated_at, 0);
        assert_eq!(metadata.count, 3);
    }
}
