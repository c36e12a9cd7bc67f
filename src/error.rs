//! Error taxonomy for the catalog pipeline.
//!
//! Every class except the sink failures is counted and skipped by the orchestrator.
//! `WriteContention` and `SinkIo` abort the current partition only.

use std::path::PathBuf;
use thiserror::Error;

/// A raw path that cannot be turned into a canonical absolute form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid path '{path}': {reason}")]
pub struct InvalidPath {
    pub path: String,
    pub reason: &'static str,
}

impl InvalidPath {
    pub fn new(path: impl Into<String>, reason: &'static str) -> Self {
        Self {
            path: path.into(),
            reason,
        }
    }
}

/// Failure reported by the checkpoint store.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint database: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("checkpoint store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced while cataloguing a tree.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error(transparent)]
    InvalidPath(#[from] InvalidPath),

    /// Stat failed twice (first attempt plus one jittered retry).
    #[error("cannot stat '{path}': {source}")]
    TransientStat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Classification gave up; the file is still catalogued as indeterminate.
    #[error("classification failed for '{path}': {reason}")]
    Classification { path: PathBuf, reason: String },

    /// Sink stayed locked for every attempt.
    #[error("output sink still locked after {attempts} attempts")]
    WriteContention { attempts: u32 },

    /// Non-contention sink failure; not retried.
    #[error("output sink I/O: {0}")]
    SinkIo(#[source] std::io::Error),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("partition root '{path}' is missing or unreadable")]
    UnreadablePartitionRoot { path: PathBuf },
}

impl CatalogError {
    /// True for the classes that abort the partition being written.
    pub fn is_fatal_for_partition(&self) -> bool {
        matches!(
            self,
            CatalogError::WriteContention { .. } | CatalogError::SinkIo(_)
        )
    }
}
