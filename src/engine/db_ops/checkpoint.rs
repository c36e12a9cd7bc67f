//! SQLite-backed [`CheckpointStore`].
//!
//! Fingerprints are written into a long-lived transaction opened lazily on the first
//! upsert and closed by [`CheckpointStore::commit`] or [`CheckpointStore::rollback`]. A crash
//! before the commit loses those fingerprints but never a row, so resuming repeats the
//! affected rows.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::CheckpointError;

use super::{
    CheckpointStore, FINISH_PARTITION_SQL, UPSERT_FINGERPRINT_SQL, open_db, open_db_in_memory,
};

pub struct SqliteCheckpoint {
    conn: Connection,
}

fn unix_now() -> std::time::Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

impl SqliteCheckpoint {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn begin_if_needed(&self) -> Result<(), CheckpointError> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }
}

impl CheckpointStore for SqliteCheckpoint {
    fn is_processed(&self, path: &str, size: u64, mtime_ns: i64) -> Result<bool, CheckpointError> {
        let row: Option<(i64, i64)> = self
            .conn
            .prepare_cached("SELECT size_bytes, mtime_ns FROM processed_files WHERE path_abs = ?1")?
            .query_row([path], |r| Ok((r.get(0)?, r.get(1)?)))
            .optional()?;
        Ok(matches!(row, Some((s, m)) if s == size as i64 && m == mtime_ns))
    }

    fn mark_processed(
        &mut self,
        path: &str,
        size: u64,
        mtime_ns: i64,
    ) -> Result<(), CheckpointError> {
        self.begin_if_needed()?;
        self.conn.prepare_cached(UPSERT_FINGERPRINT_SQL)?.execute(params![
            path,
            size as i64,
            mtime_ns,
            unix_now().as_millis() as i64
        ])?;
        Ok(())
    }

    fn is_partition_finished(&self, id: &str) -> Result<bool, CheckpointError> {
        let finished: Option<i64> = self
            .conn
            .query_row(
                "SELECT finished FROM scan_progress WHERE partition_id = ?1",
                [id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(finished == Some(1))
    }

    fn mark_partition_finished(&mut self, id: &str) -> Result<(), CheckpointError> {
        self.commit()?;
        self.conn
            .execute(FINISH_PARTITION_SQL, params![id, unix_now().as_secs() as i64])?;
        Ok(())
    }

    fn reset_partition(&mut self, id: &str) -> Result<(), CheckpointError> {
        self.conn
            .execute("DELETE FROM scan_progress WHERE partition_id = ?1", [id])?;
        self.commit()
    }

    fn reset_all(&mut self) -> Result<(), CheckpointError> {
        self.conn
            .execute_batch("DELETE FROM processed_files; DELETE FROM scan_progress;")?;
        self.commit()
    }

    fn commit(&mut self) -> Result<(), CheckpointError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), CheckpointError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn fingerprint_count(&self) -> Result<usize, CheckpointError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM processed_files", [], |r| r.get(0))?;
        Ok(n.max(0) as usize)
    }
}

impl Drop for SqliteCheckpoint {
    fn drop(&mut self) {
        // Rows behind pending fingerprints may not have reached the sink.
        if std::thread::panicking() {
            if let Err(e) = self.rollback() {
                log::warn!("Checkpoint rollback during unwind failed: {}", e);
            }
            return;
        }
        if let Err(e) = self.commit() {
            log::warn!("Final checkpoint commit failed: {}", e);
        }
    }
}
