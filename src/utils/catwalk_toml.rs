//! Load `.catwalk.toml` (CLI only). Lib callers build [`Opts`] directly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::engine::tools::normalize_extensions;
use crate::utils::config::PackagePaths;
use crate::{Opts, ScanMode};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CatwalkToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsSection {
    root: Option<String>,
    out: Option<String>,
    state: Option<String>,
    log_file: Option<String>,
    pdf_pages: Option<usize>,
    progress_every: Option<usize>,
    cache_every: Option<usize>,
    include_ext: Option<Vec<String>>,
    exclude_ext: Option<Vec<String>>,
    exclude_dirs: Option<Vec<String>>,
    document_ext: Option<Vec<String>>,
    limit: Option<usize>,
    workers: Option<usize>,
    scan_mode: Option<String>,
    partitions: Option<Vec<String>>,
    partition_column: Option<bool>,
    verbose: Option<bool>,
}

fn parse(path: &Path) -> Result<CatwalkToml> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parse config {}", path.display()))
}

/// Load `explicit` (must exist and parse) or `.catwalk.toml` from the working directory.
/// A broken default file is warned about and ignored.
pub(crate) fn load_catwalk_toml(explicit: Option<&Path>) -> Result<Option<CatwalkToml>> {
    if let Some(path) = explicit {
        return parse(path).map(Some);
    }
    let path = PathBuf::from(PackagePaths::get().config_filename());
    if !path.is_file() {
        return Ok(None);
    }
    Ok(parse(&path).map_err(|e| log::warn!("{:#}", e)).ok())
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($s:expr, $opts:expr, $file_field:ident => $opts_field:ident) => {
        if let Some(v) = $s.$file_field.clone() {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before applying CLI.
/// One-shot switches (fresh, reset-state, rescan) are never read from the file.
pub(crate) fn apply_file_to_opts(file: &CatwalkToml, opts: &mut Opts) -> Result<()> {
    let s = &file.settings;
    apply_file_opt!(s, opts, root => root);
    if let Some(ref p) = s.out {
        opts.out = PathBuf::from(p);
    }
    if let Some(ref p) = s.state {
        opts.state = PathBuf::from(p);
    }
    if let Some(ref p) = s.log_file {
        opts.log_file = Some(PathBuf::from(p));
    }
    apply_file_opt!(s, opts, pdf_pages => max_pages);
    apply_file_opt!(s, opts, progress_every => progress_every);
    apply_file_opt!(s, opts, cache_every => cache_every);
    if let Some(ref v) = s.include_ext {
        opts.include_ext = normalize_extensions(v);
    }
    if let Some(ref v) = s.exclude_ext {
        opts.exclude_ext = normalize_extensions(v);
    }
    if let Some(ref v) = s.document_ext {
        opts.document_ext = normalize_extensions(v);
    }
    apply_file_opt!(s, opts, exclude_dirs => exclude_dirs);
    if s.limit.is_some() {
        opts.limit = s.limit;
    }
    apply_file_opt!(s, opts, workers => workers);
    if let Some(ref m) = s.scan_mode {
        opts.scan_mode = m.parse::<ScanMode>().map_err(anyhow::Error::msg)?;
    }
    apply_file_opt!(s, opts, partitions => partitions);
    apply_file_opt!(s, opts, partition_column => partition_column);
    apply_file_opt!(s, opts, verbose => verbose);
    Ok(())
}
