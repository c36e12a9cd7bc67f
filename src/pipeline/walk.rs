//! Depth-first walk of one subtree producing canonical file paths.
//!
//! Directory listing failures are queued and walked once more after the main traversal;
//! a second failure is reported as [`WalkItem::Unreadable`]. Symbolic links to
//! directories are never followed.

use log::{debug, warn};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::fs_access::{DirItem, FileSystem, ListError, WalkIter};
use crate::engine::retry::{Sleeper, jitter_delay};
use crate::engine::tools::{canonicalize, relative_to_root};
use crate::error::InvalidPath;

/// A file found by the walk, before stat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalkedPath {
    /// Canonical absolute path.
    pub path: String,
    /// Relative to the walk root.
    pub rel_path: String,
    pub file_name: String,
}

/// One result from the walk.
#[derive(Debug)]
pub enum WalkItem {
    File(WalkedPath),
    Invalid(InvalidPath),
    Unreadable { path: Option<PathBuf>, message: String },
}

/// Lazy walk over `root`. Iterate it; every yielded item is a file, an invalid path or an
/// unreadable directory.
pub struct Walker<'a> {
    fs: &'a dyn FileSystem,
    root: String,
    exclude_dirs: Arc<HashSet<String>>,
    sleeper: Arc<dyn Sleeper>,
    current: WalkIter,
    retry_queue: VecDeque<PathBuf>,
    retrying: bool,
}

impl<'a> Walker<'a> {
    /// `root` must be canonical (see [`canonicalize`]).
    pub fn new(
        fs: &'a dyn FileSystem,
        root: &str,
        exclude_dirs: &[String],
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let exclude_dirs: Arc<HashSet<String>> = Arc::new(exclude_dirs.iter().cloned().collect());
        let current = fs.walk(Path::new(root), &exclude_dirs);
        Walker {
            fs,
            root: root.to_string(),
            exclude_dirs,
            sleeper,
            current,
            retry_queue: VecDeque::new(),
            retrying: false,
        }
    }

    /// Turn a walk entry into an item, or None for directories and directory links.
    fn to_item(&self, entry: DirItem) -> Option<WalkItem> {
        if entry.is_dir {
            return None;
        }
        if entry.is_symlink && self.fs.is_dir(&entry.path) {
            debug!("Not following directory link {}", entry.path.display());
            return None;
        }
        let Some(raw) = entry.path.to_str() else {
            return Some(WalkItem::Invalid(InvalidPath::new(
                entry.path.to_string_lossy(),
                "path is not valid UTF-8",
            )));
        };
        let path = match canonicalize(raw) {
            Ok(p) => p,
            Err(e) => return Some(WalkItem::Invalid(e)),
        };
        let rel_path = relative_to_root(&path, &self.root);
        let file_name = entry.file_name.to_string_lossy().into_owned();
        Some(WalkItem::File(WalkedPath {
            path,
            rel_path,
            file_name,
        }))
    }

    fn on_error(&mut self, err: ListError) -> Option<WalkItem> {
        match (err.path, self.retrying) {
            (Some(p), false) => {
                warn!("Listing {} failed, will retry: {}", p.display(), err.message);
                self.retry_queue.push_back(p);
                None
            }
            (path, _) => Some(WalkItem::Unreadable {
                path,
                message: err.message,
            }),
        }
    }
}

impl Iterator for Walker<'_> {
    type Item = WalkItem;

    fn next(&mut self) -> Option<WalkItem> {
        loop {
            match self.current.next() {
                Some(Ok(entry)) => {
                    if let Some(item) = self.to_item(entry) {
                        return Some(item);
                    }
                }
                Some(Err(err)) => {
                    if let Some(item) = self.on_error(err) {
                        return Some(item);
                    }
                }
                None => {
                    let dir = self.retry_queue.pop_front()?;
                    self.retrying = true;
                    self.sleeper.sleep(jitter_delay());
                    debug!("Retrying listing of {}", dir.display());
                    self.current = self.fs.walk(&dir, &self.exclude_dirs);
                }
            }
        }
    }
}
