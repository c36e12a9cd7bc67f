//! Catalog sink: CSV rows appended with contention-aware retry.

use anyhow::Context;
use log::{debug, error, warn};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::engine::retry::{Sleeper, backoff_delay, is_contention};
use crate::engine::tools::size_kb_mb;
use crate::error::CatalogError;
use crate::utils::config::{CATALOG_HEADER, PARTITION_COLUMN, RetryConsts};
use crate::{ClassificationFlag, FileEntry};

/// Encode one record with the csv crate (`\n` terminator, minimal quoting).
fn encode_row(fields: &[String]) -> io::Result<Vec<u8>> {
    let mut w = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(128));
    w.write_record(fields)
        .map_err(|e| io::Error::other(e.to_string()))?;
    w.into_inner().map_err(|e| io::Error::other(e.to_string()))
}

/// Appends rows to `W`, retrying while another process holds the file.
///
/// Encoded bytes wait in `pending` until `W` accepts them, so a retry resumes after the
/// bytes already written instead of repeating the row.
pub struct RecordWriter<W: Write> {
    inner: W,
    sleeper: Arc<dyn Sleeper>,
    pending: Vec<u8>,
    rows: usize,
    retries: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W, sleeper: Arc<dyn Sleeper>) -> Self {
        RecordWriter {
            inner,
            sleeper,
            pending: Vec::with_capacity(256),
            rows: 0,
            retries: 0,
        }
    }

    /// Append one row. Contention is retried with exponential backoff; any other I/O error
    /// fails at once.
    pub fn append(&mut self, fields: &[String]) -> Result<(), CatalogError> {
        let bytes = encode_row(fields).map_err(CatalogError::SinkIo)?;
        self.pending.extend_from_slice(&bytes);
        self.with_backoff(Self::write_pending)?;
        self.rows += 1;
        Ok(())
    }

    /// Write pending bytes, then flush `W`. Both steps are retried on contention.
    pub fn flush(&mut self) -> Result<(), CatalogError> {
        self.with_backoff(Self::write_pending)?;
        self.with_backoff(Self::flush_inner)
    }

    /// One write of the pending bytes. True once nothing is left.
    fn write_pending(&mut self) -> io::Result<bool> {
        if self.pending.is_empty() {
            return Ok(true);
        }
        let n = self.inner.write(&self.pending)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "sink accepted no bytes"));
        }
        self.pending.drain(..n);
        Ok(self.pending.is_empty())
    }

    fn flush_inner(&mut self) -> io::Result<bool> {
        self.inner.flush().map(|()| true)
    }

    /// Repeat `step` until it reports completion, sleeping between contended attempts.
    fn with_backoff(
        &mut self,
        step: fn(&mut Self) -> io::Result<bool>,
    ) -> Result<(), CatalogError> {
        let attempts = RetryConsts::WRITE_ATTEMPTS;
        let mut failed = 0;
        loop {
            match step(self) {
                Ok(true) => {
                    if failed > 0 {
                        debug!("Sink write succeeded after {} retries", failed);
                    }
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if is_contention(&e) => {
                    failed += 1;
                    error!("Sink locked (attempt {}/{}): {}", failed, attempts, e);
                    if failed >= attempts {
                        warn!("Giving up on sink after {} attempts", attempts);
                        return Err(CatalogError::WriteContention { attempts });
                    }
                    self.retries += 1;
                    self.sleeper.sleep(backoff_delay(failed - 1));
                }
                Err(e) => return Err(CatalogError::SinkIo(e)),
            }
        }
    }

    /// Rows appended through this writer.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Backoff sleeps taken so far.
    pub fn retries(&self) -> usize {
        self.retries
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl RecordWriter<BufWriter<File>> {
    /// Flush the buffer and push file data to disk. Must precede every checkpoint commit.
    pub fn sync(&mut self) -> Result<(), CatalogError> {
        self.flush()?;
        self.inner.get_ref().sync_data().map_err(CatalogError::SinkIo)
    }
}

/// Header row, with the partition column when enabled.
pub fn header_row(partition_column: bool) -> Vec<String> {
    let mut h: Vec<String> = CATALOG_HEADER.iter().map(|s| s.to_string()).collect();
    if partition_column {
        h.push(PARTITION_COLUMN.to_string());
    }
    h
}

/// Open the sink at `path`. Truncating writes the header; appending keeps existing rows.
pub fn create_sink(
    path: &Path,
    truncate: bool,
    partition_column: bool,
    sleeper: Arc<dyn Sleeper>,
) -> anyhow::Result<RecordWriter<BufWriter<File>>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output directory {}", parent.display()))?;
    }
    let file = if truncate {
        File::create(path)
    } else {
        OpenOptions::new().append(true).create(true).open(path)
    }
    .with_context(|| format!("open output {}", path.display()))?;
    let mut writer = RecordWriter::new(BufWriter::new(file), sleeper);
    if truncate {
        writer
            .append(&header_row(partition_column))
            .with_context(|| format!("write header to {}", path.display()))?;
        writer.rows = 0;
    }
    Ok(writer)
}

/// Row for one file. `flag` is None for files that are not documents.
pub fn catalog_row(
    entry: &FileEntry,
    flag: Option<ClassificationFlag>,
    partition: Option<&str>,
) -> Vec<String> {
    let (kb, mb) = size_kb_mb(entry.size);
    let mut row = vec![
        entry.stem.clone(),
        entry.ext.clone(),
        format!("{kb:.2}"),
        format!("{mb:.2}"),
        entry.rel_path.clone(),
        flag.map(ClassificationFlag::as_cell).unwrap_or("").to_string(),
    ];
    if let Some(p) = partition {
        row.push(p.to_string());
    }
    row
}
