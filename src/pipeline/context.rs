//! Run accounting: counters, partition outcomes and the summary handed back to callers.
//!
//! Everything here is owned by the control thread. Workers never touch a counter; their
//! results arrive as completions and are tallied when the control thread handles them.

use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

use crate::ClassificationFlag;

/// Counters for one partition or a whole run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    /// Rows written.
    pub processed: usize,
    /// Files skipped because their fingerprint matched.
    pub skipped: usize,
    /// Files dropped by the extension filters.
    pub filtered: usize,
    /// Invalid paths, failed stats, unreadable directories, checkpoint failures.
    pub errors: usize,
    pub image_only: usize,
    pub has_text: usize,
    pub indeterminate: usize,
}

impl Tally {
    pub fn count_flag(&mut self, flag: ClassificationFlag) {
        match flag {
            ClassificationFlag::ImageOnly => self.image_only += 1,
            ClassificationFlag::HasText => self.has_text += 1,
            ClassificationFlag::Indeterminate => self.indeterminate += 1,
        }
    }

    /// Take back rows, and their flags, that never reached the sink.
    pub fn discard_rows(&mut self, lost: &Tally) {
        self.processed = self.processed.saturating_sub(lost.processed);
        self.image_only = self.image_only.saturating_sub(lost.image_only);
        self.has_text = self.has_text.saturating_sub(lost.has_text);
        self.indeterminate = self.indeterminate.saturating_sub(lost.indeterminate);
    }

    /// Files looked at (rows, skips and errors).
    pub fn handled(&self) -> usize {
        self.processed + self.skipped + self.errors
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, o: Tally) {
        self.processed += o.processed;
        self.skipped += o.skipped;
        self.filtered += o.filtered;
        self.errors += o.errors;
        self.image_only += o.image_only;
        self.has_text += o.has_text;
        self.indeterminate += o.indeterminate;
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed | {} skipped | {} filtered | {} errors | documents [1={}, 0={}, ''={}]",
            self.processed,
            self.skipped,
            self.filtered,
            self.errors,
            self.image_only,
            self.has_text,
            self.indeterminate
        )
    }
}

/// Why a partition was not walked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyFinished,
    MissingRoot,
}

/// Terminal state of one partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartitionOutcome {
    Finished,
    Skipped(SkipReason),
    /// Sink failure; rows already written stay, the partition is retried next run.
    Aborted(String),
    /// Limit or cancellation stopped new work; in-flight work was drained.
    Halted,
}

/// Result of one partition.
#[derive(Clone, Debug)]
pub struct PartitionReport {
    pub id: String,
    pub outcome: PartitionOutcome,
    pub tally: Tally,
    pub elapsed: Duration,
}

impl PartitionReport {
    /// Files per second over the partition's wall time.
    pub fn rate(&self) -> f64 {
        rate(self.tally.handled(), self.elapsed)
    }
}

/// Result of a whole run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub totals: Tally,
    pub partitions: Vec<PartitionReport>,
    pub elapsed: Duration,
    /// Largest in-flight classification set seen.
    pub peak_pending: usize,
}

impl RunSummary {
    pub fn rate(&self) -> f64 {
        rate(self.totals.handled(), self.elapsed)
    }

    pub fn partition(&self, id: &str) -> Option<&PartitionReport> {
        self.partitions.iter().find(|p| p.id == id)
    }
}

fn rate(n: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { n as f64 / secs } else { 0.0 }
}

/// `1h 2m 3s` style duration for summaries.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    match (h, m) {
        (0, 0) => format!("{s}s"),
        (0, _) => format!("{m}m {s}s"),
        _ => format!("{h}h {m}m {s}s"),
    }
}

/// Counters of finished partitions plus the one in progress.
#[derive(Debug, Default)]
pub struct RunContext {
    completed: Tally,
    pub current: Tally,
}

impl RunContext {
    /// Global view including the partition in progress.
    pub fn live(&self) -> Tally {
        let mut t = self.completed;
        t += self.current;
        t
    }

    /// Fold the current partition into the totals and return its tally.
    pub fn close_partition(&mut self) -> Tally {
        let t = std::mem::take(&mut self.current);
        self.completed += t;
        t
    }

    pub fn totals(&self) -> Tally {
        self.completed
    }
}
