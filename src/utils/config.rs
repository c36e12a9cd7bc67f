//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived file names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }
}

// ---- Defaults ----

/// Defaults for [`Opts`](crate::Opts) fields not given on the CLI or in the config file.
pub struct Defaults;

impl Defaults {
    pub const OUT: &'static str = "catalog.csv";
    pub const STATE: &'static str = "catwalk_state.sqlite";
    pub const MAX_PAGES: usize = 5;
    pub const PROGRESS_EVERY: usize = 500;
    pub const CACHE_EVERY: usize = 5000;
    /// Upper bound for the derived worker count.
    pub const MAX_WORKERS: usize = 8;
}

/// `min(8, 2 * available threads)`, at least 1.
pub fn default_workers() -> usize {
    (rayon::current_num_threads() * 2).clamp(1, Defaults::MAX_WORKERS)
}

// ---- Dispatch ----

/// In-flight classifications allowed per worker before the control thread drains.
pub const PENDING_PER_WORKER: usize = 5;

// ---- Retry ----

/// Retry timings for sink contention and transient I/O.
pub struct RetryConsts;

impl RetryConsts {
    /// Total write attempts on a contended sink.
    pub const WRITE_ATTEMPTS: u32 = 6;
    /// First contention backoff; doubles per attempt.
    pub const WRITE_BACKOFF_BASE: Duration = Duration::from_millis(500);
    /// Jitter window for the single retry of stat, listing and document open.
    pub const JITTER_MIN_MS: u64 = 200;
    pub const JITTER_MAX_MS: u64 = 500;
}

// ---- Output ----

/// Catalog column names, in row order.
pub const CATALOG_HEADER: [&str; 6] = [
    "file_name",
    "extension",
    "size_kb",
    "size_mb",
    "relative_path",
    "image_only",
];

/// Optional trailing column.
pub const PARTITION_COLUMN: &str = "top_level_dir";
