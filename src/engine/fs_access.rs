//! Filesystem access seam: stat and directory checks that may fail transiently.

use log::error;
use std::collections::HashSet;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::error::CatalogError;

use super::retry::{Sleeper, jitter_delay};

/// Size and modification time of a file (the fingerprint inputs).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime_ns: i64,
}

/// One entry produced by [`FileSystem::walk`]. Links are reported, not followed.
#[derive(Clone, Debug)]
pub struct DirItem {
    pub path: PathBuf,
    pub file_name: OsString,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// A directory whose listing failed during a walk.
#[derive(Clone, Debug)]
pub struct ListError {
    pub path: Option<PathBuf>,
    pub message: String,
}

pub type WalkIter = Box<dyn Iterator<Item = Result<DirItem, ListError>>>;

/// Access layer for the tree being catalogued.
pub trait FileSystem: Send + Sync {
    /// Metadata for a file, following symbolic links.
    fn stat(&self, path: &Path) -> io::Result<FileStat>;

    fn is_dir(&self, path: &Path) -> bool;

    /// Immediate subdirectory names of `path`.
    fn list_dirs(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Depth-first walk of `start` (itself included), sorted by name, without following
    /// links. Directories named in `exclude_dirs` are not entered below `start`.
    fn walk(&self, start: &Path, exclude_dirs: &Arc<HashSet<String>>) -> WalkIter;
}

/// `std::fs` backed access.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        let meta = std::fs::metadata(path)?;
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Ok(FileStat {
            size: meta.len(),
            mtime_ns,
        })
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_dirs(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let Ok(entry) = entry else { continue };
            if entry.path().is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                dirs.push(name.to_string());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn walk(&self, start: &Path, exclude_dirs: &Arc<HashSet<String>>) -> WalkIter {
        let exclude = Arc::clone(exclude_dirs);
        let entries = WalkDir::new(start)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| {
                e.depth() == 0
                    || !e.file_type().is_dir()
                    || !e.file_name().to_str().is_some_and(|n| exclude.contains(n))
            })
            .map(|res| match res {
                Ok(e) => Ok(DirItem {
                    is_dir: e.file_type().is_dir(),
                    is_symlink: e.file_type().is_symlink(),
                    file_name: e.file_name().to_os_string(),
                    path: e.into_path(),
                }),
                Err(err) => Err(ListError {
                    path: err.path().map(Path::to_path_buf),
                    message: err.to_string(),
                }),
            });
        Box::new(entries)
    }
}

/// Stat with one retry after a jittered delay.
pub fn stat_with_retry(
    fs: &dyn FileSystem,
    path: &Path,
    sleeper: &dyn Sleeper,
) -> Result<FileStat, CatalogError> {
    match fs.stat(path) {
        Ok(st) => Ok(st),
        Err(first) => {
            error!("Error accessing {}: {}", path.display(), first);
            sleeper.sleep(jitter_delay());
            fs.stat(path).map_err(|source| CatalogError::TransientStat {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}
