//! Partition-by-partition driver: walk, filter, classify or write, checkpoint.
//!
//! Everything below runs on the control thread. Documents go through the [`Dispatcher`];
//! their completions are written and checkpointed here, so the store and the sinks are
//! never shared. Fingerprints are committed only after a successful sink sync; when a
//! partition aborts, the ones written since the last sync are rolled back.

use anyhow::{Context, bail};
use kdam::Bar;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::engine::db_ops::CheckpointStore;
use crate::engine::fs_access::{FileSystem, stat_with_retry};
use crate::engine::progress::{create_counter, finish_bar, set_bar_desc, update_progress_bar};
use crate::engine::retry::Sleeper;
use crate::engine::tools::{canonicalize, partition_sink_path, split_file_name};
use crate::error::CatalogError;
use crate::utils::memory::reclaim_memory;
use crate::{ClassificationFlag, FileEntry, Opts, ScanMode};

use super::classify::Classifier;
use super::context::{
    PartitionOutcome, PartitionReport, RunContext, RunSummary, SkipReason, Tally,
    format_elapsed,
};
use super::dispatch::{Classified, Dispatcher, Submitted};
use super::error_handler::record_error;
use super::walk::{WalkItem, Walker};
use super::writer::{RecordWriter, catalog_row, create_sink};

type Sink = RecordWriter<BufWriter<File>>;

/// Id reported for the single unit of an aggregate run.
pub const AGGREGATE_ID: &str = "(all)";

/// One sink's worth of work.
#[derive(Clone, Debug)]
struct Unit {
    id: String,
    /// Canonical walk root.
    root: String,
    sink: PathBuf,
    /// Finished flags are read and written for this unit.
    tracked: bool,
}

enum Flow {
    Continue,
    Halt,
}

pub struct Orchestrator<'a> {
    opts: &'a Opts,
    store: &'a mut dyn CheckpointStore,
    classifier: Arc<dyn Classifier>,
    fs: &'a dyn FileSystem,
    sleeper: Arc<dyn Sleeper>,
    ctx: RunContext,
    /// Rows appended since the last successful sink sync.
    unsynced: Tally,
    bar: Option<Bar>,
    halt_logged: bool,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        opts: &'a Opts,
        store: &'a mut dyn CheckpointStore,
        classifier: Arc<dyn Classifier>,
        fs: &'a dyn FileSystem,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Orchestrator {
            opts,
            store,
            classifier,
            fs,
            sleeper,
            ctx: RunContext::default(),
            unsynced: Tally::default(),
            bar: None,
            halt_logged: false,
        }
    }

    /// Catalogue every unit of the run. Fails only on setup errors (bad root, rescan reset);
    /// per-file and per-partition problems end up in the summary.
    pub fn run(mut self) -> anyhow::Result<RunSummary> {
        let start = Instant::now();
        let root = canonicalize(&self.opts.root)
            .with_context(|| format!("invalid root {}", self.opts.root))?;
        if !self.fs.is_dir(Path::new(&root)) {
            bail!("root {} is not a readable directory", root);
        }

        if self.opts.reset_state {
            self.store
                .reset_all()
                .context("reset checkpoint store")?;
            info!("Checkpoint store cleared");
        }
        for id in &self.opts.rescan {
            self.store
                .reset_partition(id)
                .with_context(|| format!("reset finished flag of {id}"))?;
            info!("[{}] finished flag cleared", id);
        }

        let units = self.resolve_units(&root)?;
        info!(
            "Cataloguing {} ({} unit(s), {} worker(s))",
            root,
            units.len(),
            self.opts.workers.max(1)
        );
        debug!("Units: {:?}", units.iter().map(|u| &u.id).collect::<Vec<_>>());

        if self.opts.verbose {
            self.bar = Some(create_counter("Cataloguing"));
        }

        let mut dispatcher = Dispatcher::new(
            Arc::clone(&self.classifier),
            Arc::clone(&self.sleeper),
            self.opts.workers,
            self.opts.max_pages,
        );
        let mut reports = Vec::with_capacity(units.len());
        for unit in &units {
            if self.should_halt(0) {
                break;
            }
            let report = self.run_unit(unit, &mut dispatcher);
            let halted = report.outcome == PartitionOutcome::Halted;
            reports.push(report);
            if halted {
                break;
            }
        }
        finish_bar(&mut self.bar);

        let summary = RunSummary {
            totals: self.ctx.totals(),
            partitions: reports,
            elapsed: start.elapsed(),
            peak_pending: dispatcher.peak_pending(),
        };
        info!(
            "Done in {}: {} | {:.1} files/s",
            format_elapsed(summary.elapsed),
            summary.totals,
            summary.rate()
        );
        Ok(summary)
    }

    fn resolve_units(&self, root: &str) -> anyhow::Result<Vec<Unit>> {
        if self.opts.scan_mode == ScanMode::All {
            return Ok(vec![Unit {
                id: AGGREGATE_ID.to_string(),
                root: root.to_string(),
                sink: self.opts.out.clone(),
                tracked: false,
            }]);
        }
        let ids = if self.opts.partitions.is_empty() {
            self.fs
                .list_dirs(Path::new(root))
                .with_context(|| format!("list partitions of {root}"))?
                .into_iter()
                .filter(|d| !self.opts.exclude_dirs.contains(d))
                .collect()
        } else {
            self.opts.partitions.clone()
        };
        let mut units = Vec::with_capacity(ids.len());
        for id in ids {
            let joined = format!("{}{}{}", root.trim_end_matches(['/', '\\']), MAIN_SEPARATOR, id);
            match canonicalize(&joined) {
                Ok(unit_root) => units.push(Unit {
                    sink: partition_sink_path(&self.opts.out, &id),
                    id,
                    root: unit_root,
                    tracked: true,
                }),
                Err(e) => error!("Skipping partition '{}': {}", id, e),
            }
        }
        Ok(units)
    }

    fn run_unit(&mut self, unit: &Unit, dispatcher: &mut Dispatcher) -> PartitionReport {
        let start = Instant::now();
        set_bar_desc(&mut self.bar, &unit.id);
        let outcome = self.walk_unit(unit, dispatcher);
        let tally = self.ctx.close_partition();
        let report = PartitionReport {
            id: unit.id.clone(),
            outcome,
            tally,
            elapsed: start.elapsed(),
        };
        if !matches!(report.outcome, PartitionOutcome::Skipped(_)) {
            info!(
                "[{}] {:?}: {} | {:.1} files/s",
                report.id,
                report.outcome,
                report.tally,
                report.rate()
            );
        }
        report
    }

    fn walk_unit(&mut self, unit: &Unit, dispatcher: &mut Dispatcher) -> PartitionOutcome {
        if unit.tracked && !self.opts.fresh {
            match self.store.is_partition_finished(&unit.id) {
                Ok(true) => {
                    info!("[{}] already finished, skipping", unit.id);
                    return PartitionOutcome::Skipped(SkipReason::AlreadyFinished);
                }
                Ok(false) => {}
                Err(e) => record_error(&mut self.ctx.current, &CatalogError::from(e)),
            }
        }
        if !self.fs.is_dir(Path::new(&unit.root)) {
            let e = CatalogError::UnreadablePartitionRoot {
                path: PathBuf::from(&unit.root),
            };
            warn!("[{}] {}, skipping", unit.id, e);
            return PartitionOutcome::Skipped(SkipReason::MissingRoot);
        }

        let truncate = self.opts.fresh || self.opts.reset_state || !unit.sink.exists();
        let mut sink = match create_sink(
            &unit.sink,
            truncate,
            self.opts.partition_column,
            Arc::clone(&self.sleeper),
        ) {
            Ok(s) => s,
            Err(e) => {
                error!("[{}] cannot open sink: {:#}", unit.id, e);
                return PartitionOutcome::Aborted(format!("{e:#}"));
            }
        };
        info!(
            "[{}] starting ({} {})",
            unit.id,
            if truncate { "new" } else { "appending to" },
            unit.sink.display()
        );

        let walker = Walker::new(
            self.fs,
            &unit.root,
            &self.opts.exclude_dirs,
            Arc::clone(&self.sleeper),
        );
        let mut halted = false;
        let mut result = Ok(());
        for item in walker {
            match self.handle_item(item, unit, &mut sink, dispatcher) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt) => {
                    halted = true;
                    break;
                }
                Err(e) if e.is_fatal_for_partition() => {
                    result = Err(e);
                    break;
                }
                Err(e) => record_error(&mut self.ctx.current, &e),
            }
        }
        let result = result
            .and_then(|()| self.drain_all(unit, &mut sink, dispatcher))
            .and_then(|()| self.sync_and_commit(&mut sink));

        let outcome = match result {
            Err(e) => {
                let mut discarded = 0;
                while dispatcher.next_completion().is_some() {
                    discarded += 1;
                }
                error!(
                    "[{}] aborted: {} ({} in-flight classification(s) discarded)",
                    unit.id, e, discarded
                );
                self.discard_unsynced(unit);
                PartitionOutcome::Aborted(e.to_string())
            }
            Ok(()) if halted => PartitionOutcome::Halted,
            Ok(()) => PartitionOutcome::Finished,
        };
        if outcome == PartitionOutcome::Finished
            && unit.tracked
            && let Err(e) = self.store.mark_partition_finished(&unit.id)
        {
            record_error(&mut self.ctx.current, &CatalogError::from(e));
        }
        outcome
    }

    fn handle_item(
        &mut self,
        item: WalkItem,
        unit: &Unit,
        sink: &mut Sink,
        dispatcher: &mut Dispatcher,
    ) -> Result<Flow, CatalogError> {
        update_progress_bar(&mut self.bar, 1);
        let walked = match item {
            WalkItem::File(w) => w,
            WalkItem::Invalid(e) => {
                record_error(&mut self.ctx.current, &CatalogError::from(e));
                return Ok(Flow::Continue);
            }
            WalkItem::Unreadable { path, message } => {
                match path {
                    Some(p) => error!("Cannot list {}: {}", p.display(), message),
                    None => error!("Cannot list directory: {}", message),
                }
                self.ctx.current.errors += 1;
                return Ok(Flow::Continue);
            }
        };

        let stat = match stat_with_retry(self.fs, Path::new(&walked.path), &*self.sleeper) {
            Ok(st) => st,
            Err(e) => {
                record_error(&mut self.ctx.current, &e);
                return Ok(Flow::Continue);
            }
        };

        if !self.opts.fresh {
            match self.store.is_processed(&walked.path, stat.size, stat.mtime_ns) {
                Ok(true) => {
                    self.ctx.current.skipped += 1;
                    return Ok(Flow::Continue);
                }
                Ok(false) => {}
                Err(e) => record_error(&mut self.ctx.current, &CatalogError::from(e)),
            }
        }

        let (stem, ext) = split_file_name(&walked.file_name);
        if !self.opts.extension_allowed(&ext) {
            self.ctx.current.filtered += 1;
            return Ok(Flow::Continue);
        }
        if self.should_halt(dispatcher.pending_len()) {
            return Ok(Flow::Halt);
        }

        let entry = FileEntry {
            path: walked.path,
            rel_path: walked.rel_path,
            stem,
            ext,
            size: stat.size,
            mtime_ns: stat.mtime_ns,
        };
        if !self.opts.is_document(&entry.ext) {
            self.record(entry, None, unit, sink)?;
            return Ok(Flow::Continue);
        }
        match dispatcher.submit(entry) {
            Submitted::Done(c) => self.record(c.entry, Some(c.flag), unit, sink)?,
            Submitted::Queued if dispatcher.at_capacity() => {
                self.drain_at_capacity(unit, sink, dispatcher)?
            }
            Submitted::Queued => {}
        }
        Ok(Flow::Continue)
    }

    /// Limit reached (rows plus in-flight) or cancellation requested.
    fn should_halt(&mut self, in_flight: usize) -> bool {
        let reason = if self
            .opts
            .cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
        {
            Some("cancelled")
        } else if self
            .opts
            .limit
            .is_some_and(|l| self.ctx.live().processed + in_flight >= l)
        {
            Some("limit reached")
        } else {
            None
        };
        match reason {
            Some(r) => {
                if !self.halt_logged {
                    warn!("{}; no new files will be dispatched", r);
                    self.halt_logged = true;
                }
                true
            }
            None => false,
        }
    }

    /// Partition column value: the unit id, or the first path component in aggregate mode.
    fn partition_label(&self, unit: &Unit, entry: &FileEntry) -> Option<String> {
        if !self.opts.partition_column {
            return None;
        }
        if unit.tracked {
            return Some(unit.id.clone());
        }
        let label = match entry.rel_path.split_once(['/', '\\']) {
            Some((first, _)) => first,
            None => "",
        };
        Some(label.to_string())
    }

    /// Write one row, count it, then checkpoint it.
    fn record(
        &mut self,
        entry: FileEntry,
        flag: Option<ClassificationFlag>,
        unit: &Unit,
        sink: &mut Sink,
    ) -> Result<(), CatalogError> {
        let label = self.partition_label(unit, &entry);
        sink.append(&catalog_row(&entry, flag, label.as_deref()))?;
        for t in [&mut self.ctx.current, &mut self.unsynced] {
            t.processed += 1;
            if let Some(f) = flag {
                t.count_flag(f);
            }
        }
        if let Err(e) = self
            .store
            .mark_processed(&entry.path, entry.size, entry.mtime_ns)
        {
            record_error(&mut self.ctx.current, &CatalogError::from(e));
        }
        self.maintenance(sink)
    }

    fn record_classified(
        &mut self,
        c: Classified,
        unit: &Unit,
        sink: &mut Sink,
    ) -> Result<(), CatalogError> {
        self.record(c.entry, Some(c.flag), unit, sink)
    }

    /// Progress and cache cadences, counted in rows written across the run.
    fn maintenance(&mut self, sink: &mut Sink) -> Result<(), CatalogError> {
        let processed = self.ctx.live().processed;
        let every = self.opts.progress_every;
        if every > 0 && processed % every == 0 {
            info!("Progress: {}", self.ctx.live());
            self.sync_and_commit(sink)?;
        }
        let cache_every = self.opts.cache_every;
        if cache_every > 0 && processed % cache_every == 0 {
            debug!("Compacting classifier cache after {} files", processed);
            self.classifier.compact_cache();
            reclaim_memory();
        }
        Ok(())
    }

    /// At capacity: take one completion (blocking), then whatever else is ready, then
    /// make the written rows and their fingerprints durable.
    fn drain_at_capacity(
        &mut self,
        unit: &Unit,
        sink: &mut Sink,
        dispatcher: &mut Dispatcher,
    ) -> Result<(), CatalogError> {
        if let Some(c) = dispatcher.next_completion() {
            self.record_classified(c, unit, sink)?;
        }
        while let Some(c) = dispatcher.try_next_completion() {
            self.record_classified(c, unit, sink)?;
        }
        self.sync_and_commit(sink)
    }

    fn drain_all(
        &mut self,
        unit: &Unit,
        sink: &mut Sink,
        dispatcher: &mut Dispatcher,
    ) -> Result<(), CatalogError> {
        while let Some(c) = dispatcher.next_completion() {
            self.record_classified(c, unit, sink)?;
        }
        Ok(())
    }

    /// Push written rows to disk, then make their fingerprints durable.
    fn sync_and_commit(&mut self, sink: &mut Sink) -> Result<(), CatalogError> {
        sink.sync()?;
        self.unsynced = Tally::default();
        self.commit_store();
        Ok(())
    }

    /// After a sink failure: forget fingerprints and counts of rows not known to be on disk.
    fn discard_unsynced(&mut self, unit: &Unit) {
        if let Err(e) = self.store.rollback() {
            record_error(&mut self.ctx.current, &CatalogError::from(e));
        }
        let lost = std::mem::take(&mut self.unsynced);
        if lost.processed > 0 {
            warn!(
                "[{}] {} row(s) not confirmed on disk; they will be catalogued again",
                unit.id, lost.processed
            );
        }
        self.ctx.current.discard_rows(&lost);
    }

    fn commit_store(&mut self) {
        if let Err(e) = self.store.commit() {
            record_error(&mut self.ctx.current, &CatalogError::from(e));
        }
    }
}
