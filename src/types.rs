//! Public and internal types for the catwalk API and pipeline.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::utils::config::{Defaults, default_workers};

/// Metadata for a single catalogued file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    /// Canonical absolute path (also the checkpoint key).
    pub path: String,
    /// Path relative to the walk root.
    pub rel_path: String,
    /// File name without extension.
    pub stem: String,
    /// Lowercase extension without the dot; empty when there is none.
    pub ext: String,
    pub size: u64,
    /// Modification time in nanoseconds since epoch.
    pub mtime_ns: i64,
}

/// Content classification of a document file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClassificationFlag {
    ImageOnly,
    HasText,
    Indeterminate,
}

impl ClassificationFlag {
    /// Cell value in the catalog: `"1"` image-only, `"0"` has text, `""` otherwise.
    pub fn as_cell(self) -> &'static str {
        match self {
            ClassificationFlag::ImageOnly => "1",
            ClassificationFlag::HasText => "0",
            ClassificationFlag::Indeterminate => "",
        }
    }
}

/// How the root is split into output sinks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanMode {
    /// Whole tree into the base output file, no partition checkpoints.
    All,
    /// One sink and one finished flag per first-level directory.
    #[default]
    PerPartition,
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ScanMode::All),
            "per-partition" | "per-topdir" => Ok(ScanMode::PerPartition),
            other => Err(format!("unknown scan mode '{other}' (expected all or per-partition)")),
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::All => f.write_str("all"),
            ScanMode::PerPartition => f.write_str("per-partition"),
        }
    }
}

/// Full options (CLI and lib).
#[derive(Clone, Debug)]
pub struct Opts {
    /// Root of the tree (local path or network share).
    pub root: String,
    /// Base output CSV. Per-partition sinks are derived from its directory and stem.
    pub out: PathBuf,
    /// Checkpoint database path.
    pub state: PathBuf,
    /// Optional log file; stderr when None.
    pub log_file: Option<PathBuf>,
    pub scan_mode: ScanMode,
    /// Partitions to process, in order. Empty means every first-level directory.
    pub partitions: Vec<String>,
    /// Partitions whose finished flag is cleared before the run.
    pub rescan: Vec<String>,
    /// Append a `top_level_dir` column.
    pub partition_column: bool,
    /// Classification concurrency. 1 classifies inline on the control thread.
    pub workers: usize,
    /// Page budget per document.
    pub max_pages: usize,
    /// Files processed between progress reports and checkpoint commits. 0 disables.
    pub progress_every: usize,
    /// Files processed between cache compaction passes. 0 disables.
    pub cache_every: usize,
    pub include_ext: Vec<String>,
    pub exclude_ext: Vec<String>,
    /// Directory names never descended into (exact match).
    pub exclude_dirs: Vec<String>,
    /// Extensions routed through the classifier.
    pub document_ext: Vec<String>,
    /// Stop dispatching new files after this many rows.
    pub limit: Option<usize>,
    /// Ignore fingerprints and finished flags; truncate sinks.
    pub fresh: bool,
    /// Delete the checkpoint database before starting.
    pub reset_state: bool,
    /// Debug logging and a progress bar.
    pub verbose: bool,
    /// Set by a signal handler; stops new dispatch like `limit`.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for Opts {
    fn default() -> Self {
        Opts {
            root: String::from("."),
            out: PathBuf::from(Defaults::OUT),
            state: PathBuf::from(Defaults::STATE),
            log_file: None,
            scan_mode: ScanMode::default(),
            partitions: Vec::new(),
            rescan: Vec::new(),
            partition_column: false,
            workers: default_workers(),
            max_pages: Defaults::MAX_PAGES,
            progress_every: Defaults::PROGRESS_EVERY,
            cache_every: Defaults::CACHE_EVERY,
            include_ext: Vec::new(),
            exclude_ext: Vec::new(),
            exclude_dirs: Vec::new(),
            document_ext: vec![String::from("pdf")],
            limit: None,
            fresh: false,
            reset_state: false,
            verbose: false,
            cancel: None,
        }
    }
}

impl Opts {
    pub fn is_document(&self, ext: &str) -> bool {
        self.document_ext.iter().any(|d| d == ext)
    }

    /// False when the extension is outside the include set or inside the exclude set.
    pub fn extension_allowed(&self, ext: &str) -> bool {
        if !self.include_ext.is_empty() && !self.include_ext.iter().any(|e| e == ext) {
            return false;
        }
        !self.exclude_ext.iter().any(|e| e == ext)
    }
}
