use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use quiver_core::{Cursor, Metadata, State};
use quiver_engine::{Shard, ShardConfig};
use quiver_harness::TestShard;
use quiver_storage::StorageError;

// ============================================================================
// Bulk copy ingestion
// ============================================================================

#[test]
fn copy_with_duplicate_destination_falls_back_to_update() -> Result<(), Box<dyn std::error::Error>>
{
    let t = TestShard::new()?;
    t.shard.write_copies(&[
        TestShard::edge(7, 1, 100, 10, State::Normal),
        TestShard::edge(7, 1, 200, 10, State::Archived),
    ])?;

    let edge = t.shard.get(7, 1)?.expect("edge should exist");
    assert_eq!(edge.state, State::Archived);
    assert_eq!(t.shard.count(7, &[State::Normal])?, 0);

    let stats = t.shard.stats();
    assert_eq!(stats.copy_bursts, 1);
    assert_eq!(stats.copy_fallbacks, 1);

    Ok(())
}

#[test]
fn copy_groups_contiguous_sources_into_bursts() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestShard::new()?;
    t.shard.write_copies(&[
        TestShard::edge(1, 11, 100, 10, State::Normal),
        TestShard::edge(1, 12, 200, 10, State::Normal),
        TestShard::edge(1, 13, 300, 10, State::Removed),
        TestShard::edge(2, 11, 100, 10, State::Normal),
        TestShard::edge(2, 12, 200, 10, State::Normal),
    ])?;

    assert_eq!(t.shard.count(1, &[State::Normal])?, 2);
    assert_eq!(t.shard.count(2, &[State::Normal])?, 2);

    let stats = t.shard.stats();
    assert_eq!(stats.copy_bursts, 2);
    assert_eq!(stats.copy_fallbacks, 0);

    Ok(())
}

#[test]
fn copy_reconciles_against_existing_rows() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestShard::new()?;
    t.shard.add(1, 5, 100, 10)?;

    t.shard.write_copies(&[
        TestShard::edge(1, 5, 150, 20, State::Removed),
        TestShard::edge(1, 6, 200, 20, State::Normal),
    ])?;

    assert_eq!(t.shard.get(1, 5)?.map(|e| e.state), Some(State::Removed));
    assert_eq!(t.shard.get(1, 6)?.map(|e| e.state), Some(State::Normal));
    // one edge left the Normal bucket, one entered: the count is unchanged
    assert_eq!(t.shard.count(1, &[State::Normal])?, 1);
    assert!(t.shard.stats().copy_fallbacks >= 1);

    Ok(())
}

#[test]
fn stale_copy_rows_do_not_downgrade() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestShard::new()?;
    t.shard.add(1, 5, 100, 100)?;

    t.shard
        .write_copies(&[TestShard::edge(1, 5, 50, 50, State::Archived)])?;

    let edge = t.shard.get(1, 5)?.expect("edge should exist");
    assert_eq!(edge.state, State::Normal);
    assert_eq!(edge.updated_at, 100);
    assert_eq!(t.shard.count(1, &[State::Normal])?, 1);

    Ok(())
}

// ============================================================================
// Metadata lifecycle
// ============================================================================

#[test]
fn write_metadata_inserts_then_guards_updates() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestShard::new()?;

    t.shard.write_metadata(&Metadata {
        source_id: 9,
        count: 5,
        state: State::Normal,
        updated_at: 10,
    })?;
    assert_eq!(t.shard.count(9, &[State::Normal])?, 5);

    // stale mirror, dropped by the timestamp guard
    t.shard.write_metadata(&Metadata {
        source_id: 9,
        count: 99,
        state: State::Negative,
        updated_at: 5,
    })?;
    assert_eq!(t.shard.count(9, &[State::Normal])?, 5);

    // newer mirror wins
    t.shard.write_metadata(&Metadata {
        source_id: 9,
        count: 2,
        state: State::Archived,
        updated_at: 20,
    })?;
    assert_eq!(t.shard.count(9, &[State::Archived])?, 2);
    assert_eq!(t.shard.count(9, &[State::Normal])?, 0);

    Ok(())
}

#[test]
fn source_lifecycle_recounts_on_transition() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestShard::new()?;
    t.shard.add(1, 10, 100, 10)?;
    t.shard.add(1, 11, 200, 20)?;
    assert_eq!(t.shard.count(1, &[State::Normal])?, 2);

    // archiving the source flips the metadata state; the edges themselves
    // are still Normal, so the recount lands on zero
    t.shard.archive_source(1, 30)?;
    assert_eq!(t.shard.count(1, &[State::Normal])?, 0);
    assert_eq!(t.shard.count(1, &[State::Archived])?, 0);

    // archiving the edges now counts them against the archived source
    t.shard.archive(1, 10, 100, 40)?;
    t.shard.archive(1, 11, 200, 40)?;
    assert_eq!(t.shard.count(1, &[State::Archived])?, 2);

    // reactivate the source, then the edges
    t.shard.add_source(1, 50)?;
    assert_eq!(t.shard.count(1, &[State::Normal])?, 0);
    t.shard.add(1, 10, 300, 60)?;
    t.shard.add(1, 11, 400, 60)?;
    assert_eq!(t.shard.count(1, &[State::Normal])?, 2);

    Ok(())
}

#[test]
fn source_transition_replay_respects_precedence() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestShard::new()?;
    t.shard.add(9, 5, 100, 5)?;
    assert_eq!(t.shard.count(9, &[State::Normal])?, 1);

    t.shard.archive_source(9, 10)?;
    assert_eq!(t.shard.count(9, &[State::Normal])?, 0);

    // same timestamp, lower-precedence state: dropped
    t.shard.add_source(9, 10)?;
    assert_eq!(t.shard.count(9, &[State::Normal])?, 0);

    // newer timestamp: applied
    t.shard.add_source(9, 11)?;
    assert_eq!(t.shard.count(9, &[State::Normal])?, 1);

    Ok(())
}

// ============================================================================
// Scoped locking
// ============================================================================

#[test]
fn with_lock_chains_writes_under_one_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestShard::new()?;

    let seen = t.shard.with_lock(1, |locked| {
        assert_eq!(locked.metadata().count, 0);
        assert_eq!(locked.metadata().state, State::Normal);
        locked.write(&TestShard::edge(1, 5, 100, 10, State::Normal))?;
        locked.write(&TestShard::edge(1, 6, 200, 10, State::Normal))?;
        Ok(locked.get(5)?.map(|e| e.destination_id))
    })?;

    assert_eq!(seen, Some(5));
    assert_eq!(t.shard.count(1, &[State::Normal])?, 2);

    Ok(())
}

#[test]
fn with_lock_rolls_back_on_error() -> Result<(), Box<dyn std::error::Error>> {
    let t = TestShard::new()?;

    let result: Result<(), _> = t.shard.with_lock(1, |locked| {
        locked.write(&TestShard::edge(1, 5, 100, 10, State::Normal))?;
        Err(StorageError::MissingMetadata { source_id: 1 })
    });
    assert!(result.is_err());

    assert!(t.shard.get(1, 5)?.is_none());
    assert_eq!(t.shard.count(1, &[State::Normal])?, 0);

    Ok(())
}

// ============================================================================
// Error tagging
// ============================================================================

#[test]
fn boundary_errors_carry_the_shard_identity() {
    let config = ShardConfig::new("/nonexistent-dir/edges.db", "t");
    let error = Shard::open(&config).expect_err("open should fail");
    assert_eq!(error.shard_id(), "/nonexistent-dir/edges.db/t");
    assert!(error.to_string().starts_with("shard /nonexistent-dir/edges.db/t"));
}

// ============================================================================
// Concurrent writers
// ============================================================================

#[test]
fn concurrent_writers_preserve_the_count_invariant() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("edges.db");
    let t = TestShard::at_path(path.to_str().expect("utf-8 temp path"))?;
    let shard = Arc::new(t.shard);

    let mut handles = Vec::new();
    for worker in 0..4u64 {
        let shard = Arc::clone(&shard);
        handles.push(thread::spawn(move || {
            for i in 0..25u64 {
                let destination = worker * 100 + i + 1;
                shard
                    .add(1, destination, destination as i64, 10)
                    .expect("concurrent write");
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    assert_eq!(shard.count(1, &[State::Normal])?, 100);

    let mut all = Vec::new();
    let mut cursor = Cursor::Start;
    loop {
        let window = shard.select_by_destination_id(1, &[State::Normal], 17, cursor)?;
        all.extend(window.page);
        if window.next_cursor.is_end() {
            break;
        }
        cursor = window.next_cursor;
    }
    assert_eq!(all.len(), 100);

    let mut results = HashMap::new();
    shard.counts(&[1], &mut results)?;
    assert_eq!(results.get(&1), Some(&100));

    Ok(())
}

#[test]
fn concurrent_writes_to_one_edge_settle_on_the_newest() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("edges.db");
    let t = TestShard::at_path(path.to_str().expect("utf-8 temp path"))?;
    let shard = Arc::new(t.shard);

    let mut handles = Vec::new();
    for i in 1..=4u32 {
        let shard = Arc::clone(&shard);
        handles.push(thread::spawn(move || {
            shard
                .add(5, 9, (i as i64) * 100, i * 10)
                .expect("concurrent write");
        }));
    }
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    let edge = shard.get(5, 9)?.expect("edge should exist");
    assert_eq!(edge.updated_at, 40);
    assert_eq!(edge.position, 400);
    assert_eq!(shard.count(5, &[State::Normal])?, 1);

    Ok(())
}
