//! Checkpoint store tests: fingerprints, partition flags, commit and reset.

use catwalk::engine::db_ops::{CheckpointStore, SqliteCheckpoint, open_db, open_db_in_memory};
use tempfile::TempDir;

#[test]
fn test_fingerprint_match_requires_same_size_and_mtime() {
    let mut store = SqliteCheckpoint::in_memory().unwrap();
    assert!(!store.is_processed("/r/a.txt", 10, 100).unwrap());

    store.mark_processed("/r/a.txt", 10, 100).unwrap();
    assert!(store.is_processed("/r/a.txt", 10, 100).unwrap());
    assert!(!store.is_processed("/r/a.txt", 11, 100).unwrap());
    assert!(!store.is_processed("/r/a.txt", 10, 101).unwrap());
    assert!(!store.is_processed("/r/b.txt", 10, 100).unwrap());
}

#[test]
fn test_mark_processed_is_an_upsert() {
    let mut store = SqliteCheckpoint::in_memory().unwrap();
    store.mark_processed("/r/a.txt", 10, 100).unwrap();
    store.mark_processed("/r/a.txt", 10, 100).unwrap();
    store.mark_processed("/r/a.txt", 20, 200).unwrap();
    store.commit().unwrap();
    assert_eq!(store.fingerprint_count().unwrap(), 1);
    assert!(store.is_processed("/r/a.txt", 20, 200).unwrap());
    assert!(!store.is_processed("/r/a.txt", 10, 100).unwrap());
}

#[test]
fn test_partition_flags() {
    let mut store = SqliteCheckpoint::in_memory().unwrap();
    assert!(!store.is_partition_finished("p").unwrap());
    store.mark_partition_finished("p").unwrap();
    store.mark_partition_finished("p").unwrap();
    assert!(store.is_partition_finished("p").unwrap());
    assert!(!store.is_partition_finished("q").unwrap());

    store.reset_partition("p").unwrap();
    assert!(!store.is_partition_finished("p").unwrap());
}

#[test]
fn test_reset_all_clears_everything() {
    let mut store = SqliteCheckpoint::in_memory().unwrap();
    store.mark_processed("/r/a.txt", 1, 1).unwrap();
    store.mark_processed("/r/b.txt", 2, 2).unwrap();
    store.mark_partition_finished("p").unwrap();
    assert_eq!(store.fingerprint_count().unwrap(), 2);

    store.reset_all().unwrap();
    assert_eq!(store.fingerprint_count().unwrap(), 0);
    assert!(!store.is_partition_finished("p").unwrap());
}

#[test]
fn test_uncommitted_fingerprints_are_not_durable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state.sqlite");
    {
        let mut store = SqliteCheckpoint::open(&path).unwrap();
        store.mark_processed("/r/a.txt", 1, 1).unwrap();
        // A second connection does not see the open transaction.
        let other = rusqlite::Connection::open(&path).unwrap();
        let n: i64 = other
            .query_row("SELECT COUNT(*) FROM processed_files", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
        store.commit().unwrap();
        let n: i64 = other
            .query_row("SELECT COUNT(*) FROM processed_files", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }
}

#[test]
fn test_drop_commits_pending_writes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state.sqlite");
    {
        let mut store = SqliteCheckpoint::open(&path).unwrap();
        store.mark_processed("/r/a.txt", 5, 50).unwrap();
    }
    let store = SqliteCheckpoint::open(&path).unwrap();
    assert!(store.is_processed("/r/a.txt", 5, 50).unwrap());
}

#[test]
fn test_mark_partition_finished_commits_pending_fingerprints() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state.sqlite");
    let mut store = SqliteCheckpoint::open(&path).unwrap();
    store.mark_processed("/r/p/a.txt", 1, 1).unwrap();
    store.mark_partition_finished("p").unwrap();

    let other = rusqlite::Connection::open(&path).unwrap();
    let n: i64 = other
        .query_row("SELECT COUNT(*) FROM processed_files", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 1);
    let finished: i64 = other
        .query_row(
            "SELECT finished FROM scan_progress WHERE partition_id = 'p'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(finished, 1);
}

#[test]
fn test_rollback_discards_uncommitted_fingerprints() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state.sqlite");
    {
        let mut store = SqliteCheckpoint::open(&path).unwrap();
        store.mark_processed("/r/a.txt", 1, 1).unwrap();
        store.commit().unwrap();
        store.mark_processed("/r/b.txt", 2, 2).unwrap();
        store.rollback().unwrap();
        assert!(!store.is_processed("/r/b.txt", 2, 2).unwrap());
        // Nothing pending, so a second rollback is a no-op.
        store.rollback().unwrap();
    }
    let store = SqliteCheckpoint::open(&path).unwrap();
    assert_eq!(store.fingerprint_count().unwrap(), 1);
    assert!(store.is_processed("/r/a.txt", 1, 1).unwrap());
}

#[test]
fn test_reset_all_persists_after_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("state.sqlite");
    {
        let mut store = SqliteCheckpoint::open(&path).unwrap();
        store.mark_processed("/r/a.txt", 1, 1).unwrap();
        store.mark_partition_finished("p").unwrap();
        store.reset_all().unwrap();
    }
    let store = SqliteCheckpoint::open(&path).unwrap();
    assert_eq!(store.fingerprint_count().unwrap(), 0);
    assert!(!store.is_partition_finished("p").unwrap());
}

#[test]
fn test_schema_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state.sqlite");
    drop(open_db(&path).unwrap());
    let conn = open_db(&path).unwrap();
    let mode: String = conn
        .query_row("PRAGMA journal_mode", [], |r| r.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
    let mem = open_db_in_memory().unwrap();
    let n: i64 = mem
        .query_row("SELECT COUNT(*) FROM scan_progress", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 0);
}
