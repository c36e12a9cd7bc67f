//! Fakes shared by the integration tests.
#![allow(dead_code)]

use catwalk::engine::db_ops::{CheckpointStore, SqliteCheckpoint};
use catwalk::engine::fs_access::{FileStat, FileSystem, ListError, LocalFs, WalkIter};
use catwalk::engine::retry::{RecordingSleeper, Sleeper};
use catwalk::pipeline::{Classifier, ClassifyError, Orchestrator, RunSummary};
use catwalk::{CheckpointError, ClassificationFlag, Opts};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// Classifies by file name; unknown names are indeterminate.
#[derive(Default)]
pub struct NameClassifier {
    flags: HashMap<String, ClassificationFlag>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub compactions: AtomicUsize,
}

impl NameClassifier {
    pub fn new(flags: &[(&str, ClassificationFlag)]) -> Self {
        NameClassifier {
            flags: flags.iter().map(|(n, f)| (n.to_string(), *f)).collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Classifier for NameClassifier {
    fn classify(&self, path: &Path, _max_pages: usize) -> Result<ClassificationFlag, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self
            .flags
            .get(&name)
            .copied()
            .unwrap_or(ClassificationFlag::Indeterminate))
    }

    fn compact_cache(&self) {
        self.compactions.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fails to open each document `failures` times, then reports `flag`.
pub struct FlakyOpenClassifier {
    failures: usize,
    flag: ClassificationFlag,
    seen: Mutex<HashMap<PathBuf, usize>>,
}

impl FlakyOpenClassifier {
    pub fn new(failures: usize, flag: ClassificationFlag) -> Self {
        FlakyOpenClassifier {
            failures,
            flag,
            seen: Mutex::new(HashMap::new()),
        }
    }
}

impl Classifier for FlakyOpenClassifier {
    fn classify(&self, path: &Path, _max_pages: usize) -> Result<ClassificationFlag, ClassifyError> {
        let mut seen = self.seen.lock().unwrap();
        let n = seen.entry(path.to_path_buf()).or_insert(0);
        *n += 1;
        if *n <= self.failures {
            Err(ClassifyError::Open("share timed out".into()))
        } else {
            Ok(self.flag)
        }
    }
}

pub struct ErrClassifier(pub ClassifyError);

impl Classifier for ErrClassifier {
    fn classify(&self, _path: &Path, _max_pages: usize) -> Result<ClassificationFlag, ClassifyError> {
        Err(self.0.clone())
    }
}

pub struct PanickingClassifier;

impl Classifier for PanickingClassifier {
    fn classify(&self, _path: &Path, _max_pages: usize) -> Result<ClassificationFlag, ClassifyError> {
        panic!("document engine crashed");
    }
}

/// Writer that reports `kind` for the first `failures` writes.
pub struct FlakyWriter {
    failures: usize,
    kind: io::ErrorKind,
    pub attempts: usize,
    pub data: Vec<u8>,
}

impl FlakyWriter {
    pub fn new(failures: usize, kind: io::ErrorKind) -> Self {
        FlakyWriter {
            failures,
            kind,
            attempts: 0,
            data: Vec::new(),
        }
    }
}

impl Write for FlakyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.attempts += 1;
        if self.failures > 0 {
            self.failures -= 1;
            return Err(io::Error::new(self.kind, "file is locked"));
        }
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that follows a script: `Ok(n)` accepts at most `n` bytes, `Err(kind)` fails.
/// Once the script runs out every write is accepted whole. Flush fails `flush_failures`
/// times with `PermissionDenied`.
pub struct ScriptedWriter {
    script: VecDeque<Result<usize, io::ErrorKind>>,
    flush_failures: usize,
    pub writes: usize,
    pub flushes: usize,
    pub data: Vec<u8>,
}

impl ScriptedWriter {
    pub fn new(script: Vec<Result<usize, io::ErrorKind>>) -> Self {
        ScriptedWriter {
            script: script.into(),
            flush_failures: 0,
            writes: 0,
            flushes: 0,
            data: Vec::new(),
        }
    }

    pub fn with_flush_failures(mut self, n: usize) -> Self {
        self.flush_failures = n;
        self
    }
}

impl Write for ScriptedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writes += 1;
        let n = match self.script.pop_front() {
            Some(Ok(n)) => n.min(buf.len()),
            Some(Err(kind)) => return Err(io::Error::new(kind, "file is locked")),
            None => buf.len(),
        };
        self.data.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        if self.flush_failures > 0 {
            self.flush_failures -= 1;
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file is locked"));
        }
        Ok(())
    }
}

/// Local filesystem whose stat fails `failures` times for names ending in `suffix`.
pub struct FlakyStatFs {
    suffix: String,
    failures: usize,
    seen: Mutex<HashMap<PathBuf, usize>>,
}

impl FlakyStatFs {
    pub fn new(suffix: &str, failures: usize) -> Self {
        FlakyStatFs {
            suffix: suffix.to_string(),
            failures,
            seen: Mutex::new(HashMap::new()),
        }
    }
}

impl FileSystem for FlakyStatFs {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        if path.to_string_lossy().ends_with(&self.suffix) {
            let mut seen = self.seen.lock().unwrap();
            let n = seen.entry(path.to_path_buf()).or_insert(0);
            *n += 1;
            if *n <= self.failures {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "share timed out"));
            }
        }
        LocalFs.stat(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        LocalFs.is_dir(path)
    }

    fn list_dirs(&self, path: &Path) -> io::Result<Vec<String>> {
        LocalFs.list_dirs(path)
    }

    fn walk(&self, start: &Path, exclude_dirs: &Arc<HashSet<String>>) -> WalkIter {
        LocalFs.walk(start, exclude_dirs)
    }
}

/// Local filesystem where listing directories named `dir` fails `failures` times.
pub struct FlakyListFs {
    dir: String,
    failures: Mutex<usize>,
}

impl FlakyListFs {
    pub fn new(dir: &str, failures: usize) -> Self {
        FlakyListFs {
            dir: dir.to_string(),
            failures: Mutex::new(failures),
        }
    }

    fn take_failure(&self) -> bool {
        let mut left = self.failures.lock().unwrap();
        if *left == 0 {
            return false;
        }
        *left -= 1;
        true
    }
}

impl FileSystem for FlakyListFs {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        LocalFs.stat(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        LocalFs.is_dir(path)
    }

    fn list_dirs(&self, path: &Path) -> io::Result<Vec<String>> {
        LocalFs.list_dirs(path)
    }

    /// The blocked directory itself is reported, then an error instead of its contents.
    fn walk(&self, start: &Path, exclude_dirs: &Arc<HashSet<String>>) -> WalkIter {
        let mut out = Vec::new();
        let mut blocked: Option<PathBuf> = None;
        for item in LocalFs.walk(start, exclude_dirs) {
            if let (Some(b), Ok(e)) = (&blocked, &item)
                && e.path.starts_with(b)
            {
                continue;
            }
            let fails = matches!(&item, Ok(e) if e.is_dir && e.file_name == self.dir.as_str())
                && self.take_failure();
            let path = item.as_ref().ok().map(|e| e.path.clone());
            out.push(item);
            if fails {
                out.push(Err(ListError {
                    path: path.clone(),
                    message: "Permission denied (os error 13)".into(),
                }));
                blocked = path;
            }
        }
        Box::new(out.into_iter())
    }
}

/// SQLite store whose `mark_processed` fails for paths ending in `suffix`.
pub struct FailingStore {
    pub inner: SqliteCheckpoint,
    suffix: String,
}

impl FailingStore {
    pub fn new(inner: SqliteCheckpoint, suffix: &str) -> Self {
        FailingStore {
            inner,
            suffix: suffix.to_string(),
        }
    }
}

impl CheckpointStore for FailingStore {
    fn is_processed(&self, path: &str, size: u64, mtime_ns: i64) -> Result<bool, CheckpointError> {
        self.inner.is_processed(path, size, mtime_ns)
    }

    fn mark_processed(
        &mut self,
        path: &str,
        size: u64,
        mtime_ns: i64,
    ) -> Result<(), CheckpointError> {
        if path.ends_with(&self.suffix) {
            return Err(CheckpointError::Unavailable("disk full".into()));
        }
        self.inner.mark_processed(path, size, mtime_ns)
    }

    fn is_partition_finished(&self, id: &str) -> Result<bool, CheckpointError> {
        self.inner.is_partition_finished(id)
    }

    fn mark_partition_finished(&mut self, id: &str) -> Result<(), CheckpointError> {
        self.inner.mark_partition_finished(id)
    }

    fn reset_partition(&mut self, id: &str) -> Result<(), CheckpointError> {
        self.inner.reset_partition(id)
    }

    fn reset_all(&mut self) -> Result<(), CheckpointError> {
        self.inner.reset_all()
    }

    fn commit(&mut self) -> Result<(), CheckpointError> {
        self.inner.commit()
    }

    fn rollback(&mut self) -> Result<(), CheckpointError> {
        self.inner.rollback()
    }

    fn fingerprint_count(&self) -> Result<usize, CheckpointError> {
        self.inner.fingerprint_count()
    }
}

/// Tree root and output directory for one test.
pub struct Fixture {
    pub tree: TempDir,
    pub out: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            tree: TempDir::new().unwrap(),
            out: TempDir::new().unwrap(),
        }
    }

    /// Create `rel` under the tree with `size` bytes.
    pub fn file(&self, rel: &str, size: usize) -> &Self {
        let p = self.tree.path().join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(&p, vec![b'x'; size]).unwrap();
        self
    }

    pub fn opts(&self) -> Opts {
        Opts {
            root: self.tree.path().to_str().unwrap().to_string(),
            out: self.out.path().join("catalog.csv"),
            state: self.out.path().join("state.sqlite"),
            workers: 1,
            ..Default::default()
        }
    }

    pub fn sink(&self, partition: &str) -> PathBuf {
        self.out.path().join(format!("catalog_{partition}.csv"))
    }
}

/// Run with the local filesystem and a recording sleeper.
pub fn run(
    opts: &Opts,
    store: &mut dyn CheckpointStore,
    classifier: Arc<dyn Classifier>,
) -> RunSummary {
    run_with_fs(opts, store, classifier, &LocalFs)
}

pub fn run_with_fs(
    opts: &Opts,
    store: &mut dyn CheckpointStore,
    classifier: Arc<dyn Classifier>,
    fs: &dyn FileSystem,
) -> RunSummary {
    let sleeper: Arc<dyn Sleeper> = Arc::new(RecordingSleeper::new());
    Orchestrator::new(opts, store, classifier, fs, sleeper)
        .run()
        .unwrap()
}

/// All records of a CSV file, header included.
pub fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    rdr.records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}

/// Data rows keyed by file name (first column).
pub fn rows_by_name(path: &Path) -> HashMap<String, Vec<String>> {
    read_rows(path)
        .into_iter()
        .skip(1)
        .map(|r| (r[0].clone(), r))
        .collect()
}
