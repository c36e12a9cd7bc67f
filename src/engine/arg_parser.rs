use clap::Parser;
use std::path::PathBuf;

use crate::ScanMode;

/// Resumable file catalog for large, slow directory trees.
#[derive(Clone, Debug, Default, Parser)]
#[command(name = "catwalk")]
#[command(
    about = "Walk a directory tree and write one CSV row per file; PDFs are flagged image-only or text. Re-running resumes where it stopped."
)]
pub struct Cli {
    /// Root of the tree (local path or \\server\share). Default: current directory.
    #[arg(long, short)]
    pub root: Option<String>,

    /// Base output CSV. Per-partition files are written next to it as <stem>_<partition>.csv.
    #[arg(long, short)]
    pub out: Option<PathBuf>,

    /// Checkpoint database (SQLite).
    #[arg(long, short)]
    pub state: Option<PathBuf>,

    /// Append log output to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Pages inspected per document before calling it image-only.
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub pdf_pages: Option<usize>,

    /// Files between progress reports and checkpoint commits (0 disables).
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub progress_every: Option<usize>,

    /// Files between classifier cache compaction passes (0 disables).
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub cache_every: Option<usize>,

    /// Only catalogue these extensions (comma-separated, e.g. pdf,docx).
    #[arg(long)]
    pub include_ext: Option<String>,

    /// Never catalogue these extensions (comma-separated).
    #[arg(long)]
    pub exclude_ext: Option<String>,

    /// Directory names never descended into (comma-separated, exact match).
    #[arg(long)]
    pub exclude_dirs: Option<String>,

    /// Extensions sent to the classifier (comma-separated). Default: pdf.
    #[arg(long)]
    pub document_ext: Option<String>,

    /// Stop after this many rows.
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub limit: Option<usize>,

    /// Ignore checkpoints and finished partitions; rewrite output files.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub fresh: Option<bool>,

    /// Delete the checkpoint database before starting.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub reset_state: Option<bool>,

    /// Classification threads. 1 classifies inline. Default: min(8, 2 x CPUs).
    #[arg(long, short = 'w', value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,

    /// all: one output for the whole tree; per-partition: one output per first-level directory.
    #[arg(long)]
    pub scan_mode: Option<ScanMode>,

    /// First-level directories to process, in order (comma-separated). Default: all of them.
    #[arg(long)]
    pub partitions: Option<String>,

    /// Add a top_level_dir column.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub partition_column: Option<bool>,

    /// Partitions to walk again even if finished (comma-separated).
    #[arg(long)]
    pub rescan: Option<String>,

    /// Config file. Default: .catwalk.toml in the current directory, if present.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Directory holding the pdfium shared library.
    #[cfg(feature = "pdfium")]
    #[arg(long)]
    pub pdfium_dir: Option<PathBuf>,

    /// Verbose output and a progress counter.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}
