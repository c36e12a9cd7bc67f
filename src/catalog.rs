//! Library entry point: catalogue a tree against the on-disk checkpoint store.

use anyhow::Context;
use log::debug;
use std::sync::Arc;

use crate::Opts;
use crate::engine::db_ops::SqliteCheckpoint;
use crate::engine::fs_access::LocalFs;
use crate::engine::retry::{Sleeper, ThreadSleeper};
use crate::pipeline::{Classifier, Orchestrator, RunSummary};

/// Catalogue `opts.root` with the local filesystem and the SQLite store at `opts.state`.
///
/// With `opts.reset_state` every fingerprint and partition flag is cleared before the walk.
/// Returns the run summary; only setup failures (bad root, unopenable store) are errors.
pub fn catalog_dir(opts: &Opts, classifier: Arc<dyn Classifier>) -> crate::Result<RunSummary> {
    let mut store = SqliteCheckpoint::open(&opts.state)
        .with_context(|| format!("open checkpoint store {}", opts.state.display()))?;
    debug!("Checkpoint store: {}", opts.state.display());
    let sleeper: Arc<dyn Sleeper> = Arc::new(ThreadSleeper);
    Orchestrator::new(opts, &mut store, classifier, &LocalFs, sleeper).run()
}
