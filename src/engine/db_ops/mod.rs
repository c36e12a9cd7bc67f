//! Checkpoint database: schema, open/reset, and the store used for resumable runs.

mod checkpoint;
mod connection;

pub use checkpoint::SqliteCheckpoint;
pub use connection::{open_db, open_db_in_memory};

use crate::error::CheckpointError;

/// Durable record of catalogued files and finished partitions.
///
/// Only the control thread calls these. Fingerprint writes become durable on
/// [`commit`](CheckpointStore::commit), which must follow a successful sink sync;
/// partition flags are committed immediately.
pub trait CheckpointStore {
    /// True iff a fingerprint for `path` exists with exactly this size and mtime.
    fn is_processed(&self, path: &str, size: u64, mtime_ns: i64) -> Result<bool, CheckpointError>;

    /// Insert or replace the fingerprint for `path`.
    fn mark_processed(&mut self, path: &str, size: u64, mtime_ns: i64)
    -> Result<(), CheckpointError>;

    fn is_partition_finished(&self, id: &str) -> Result<bool, CheckpointError>;

    fn mark_partition_finished(&mut self, id: &str) -> Result<(), CheckpointError>;

    /// Clear the finished flag so the partition is walked again.
    fn reset_partition(&mut self, id: &str) -> Result<(), CheckpointError>;

    /// Drop every fingerprint and partition flag.
    fn reset_all(&mut self) -> Result<(), CheckpointError>;

    /// Make pending fingerprint writes durable.
    fn commit(&mut self) -> Result<(), CheckpointError>;

    /// Discard fingerprint writes made since the last commit.
    fn rollback(&mut self) -> Result<(), CheckpointError>;

    fn fingerprint_count(&self) -> Result<usize, CheckpointError>;
}

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

/// Upsert for the fingerprint table.
pub(crate) const UPSERT_FINGERPRINT_SQL: &str = "INSERT OR REPLACE INTO processed_files (path_abs, size_bytes, mtime_ns, written_ts) VALUES (?1, ?2, ?3, ?4)";

/// Upsert for the partition table.
pub(crate) const FINISH_PARTITION_SQL: &str = "INSERT INTO scan_progress (partition_id, finished, finished_ts) VALUES (?1, 1, ?2) \
     ON CONFLICT(partition_id) DO UPDATE SET finished = excluded.finished, finished_ts = excluded.finished_ts";

/// Schema for fingerprint and partition tables.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS processed_files (
    path_abs TEXT PRIMARY KEY,
    size_bytes INTEGER NOT NULL,
    mtime_ns INTEGER NOT NULL,
    written_ts INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS scan_progress (
    partition_id TEXT PRIMARY KEY,
    finished INTEGER NOT NULL DEFAULT 0,
    finished_ts INTEGER
);
"#;
