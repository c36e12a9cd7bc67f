//! Bounded classification dispatch.
//!
//! With one worker, documents are classified inline on the control thread. With N > 1,
//! N threads take jobs from a channel and send `(ticket, flag)` back on a completion
//! channel that only the control thread reads. The control thread stops submitting once
//! `5 * N` classifications are in flight and drains at least one before continuing.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::error;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::engine::retry::Sleeper;
use crate::utils::config::PENDING_PER_WORKER;
use crate::{ClassificationFlag, FileEntry};

use super::classify::{Classifier, classify_with_fallback};

/// A document and its flag, ready to be written.
#[derive(Clone, Debug)]
pub struct Classified {
    pub entry: FileEntry,
    pub flag: ClassificationFlag,
}

/// What [`Dispatcher::submit`] did with a document.
#[derive(Debug)]
pub enum Submitted {
    /// Classified inline; write it now.
    Done(Classified),
    /// Handed to a worker; collect it through the completion methods.
    Queued,
}

struct Job {
    ticket: u64,
    path: PathBuf,
}

struct Done {
    ticket: u64,
    flag: ClassificationFlag,
}

/// Classify with the boundary retry policy; a panicking classifier gives `Indeterminate`.
fn classify_guarded(
    classifier: &dyn Classifier,
    path: &Path,
    max_pages: usize,
    sleeper: &dyn Sleeper,
) -> ClassificationFlag {
    catch_unwind(AssertUnwindSafe(|| {
        classify_with_fallback(classifier, path, max_pages, sleeper)
    }))
    .unwrap_or_else(|_| {
        error!("Classifier panicked on {}", path.display());
        ClassificationFlag::Indeterminate
    })
}

/// Single classification worker: read jobs from job_rx, send flags on done_tx.
fn classify_worker_loop(
    job_rx: Receiver<Job>,
    done_tx: Sender<Done>,
    classifier: Arc<dyn Classifier>,
    sleeper: Arc<dyn Sleeper>,
    max_pages: usize,
) {
    while let Ok(job) = job_rx.recv() {
        let flag = classify_guarded(&*classifier, &job.path, max_pages, &*sleeper);
        if done_tx
            .send(Done {
                ticket: job.ticket,
                flag,
            })
            .is_err()
        {
            break;
        }
    }
}

pub struct Dispatcher {
    classifier: Arc<dyn Classifier>,
    sleeper: Arc<dyn Sleeper>,
    max_pages: usize,
    workers: usize,
    job_tx: Option<Sender<Job>>,
    done_rx: Option<Receiver<Done>>,
    handles: Vec<JoinHandle<()>>,
    pending: HashMap<u64, FileEntry>,
    next_ticket: u64,
    peak_pending: usize,
}

impl Dispatcher {
    /// `workers` of 0 is treated as 1 (inline).
    pub fn new(
        classifier: Arc<dyn Classifier>,
        sleeper: Arc<dyn Sleeper>,
        workers: usize,
        max_pages: usize,
    ) -> Self {
        let workers = workers.max(1);
        let mut dispatcher = Dispatcher {
            classifier,
            sleeper,
            max_pages,
            workers,
            job_tx: None,
            done_rx: None,
            handles: Vec::new(),
            pending: HashMap::new(),
            next_ticket: 0,
            peak_pending: 0,
        };
        if workers > 1 {
            dispatcher.spawn_workers();
        }
        dispatcher
    }

    fn spawn_workers(&mut self) {
        let cap = self.capacity();
        let (job_tx, job_rx) = bounded::<Job>(cap);
        let (done_tx, done_rx) = bounded::<Done>(cap);
        self.handles = (0..self.workers)
            .map(|_| {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                let classifier = Arc::clone(&self.classifier);
                let sleeper = Arc::clone(&self.sleeper);
                let max_pages = self.max_pages;
                thread::spawn(move || {
                    classify_worker_loop(job_rx, done_tx, classifier, sleeper, max_pages)
                })
            })
            .collect();
        // Workers hold the only completion senders, so a dead pool closes the channel.
        drop(done_tx);
        self.job_tx = Some(job_tx);
        self.done_rx = Some(done_rx);
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Maximum in-flight classifications.
    pub fn capacity(&self) -> usize {
        PENDING_PER_WORKER * self.workers
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn peak_pending(&self) -> usize {
        self.peak_pending
    }

    /// True when the control thread must drain before submitting again.
    pub fn at_capacity(&self) -> bool {
        self.job_tx.is_some() && self.pending.len() >= self.capacity()
    }

    pub fn submit(&mut self, entry: FileEntry) -> Submitted {
        if let Some(tx) = &self.job_tx {
            let ticket = self.next_ticket;
            let job = Job {
                ticket,
                path: PathBuf::from(&entry.path),
            };
            if tx.send(job).is_ok() {
                self.next_ticket += 1;
                self.pending.insert(ticket, entry);
                self.peak_pending = self.peak_pending.max(self.pending.len());
                return Submitted::Queued;
            }
            error!("Classification pool is gone; classifying inline");
        }
        let flag = classify_guarded(
            &*self.classifier,
            Path::new(&entry.path),
            self.max_pages,
            &*self.sleeper,
        );
        Submitted::Done(Classified { entry, flag })
    }

    fn complete(&mut self, done: Done) -> Option<Classified> {
        self.pending.remove(&done.ticket).map(|entry| Classified {
            entry,
            flag: done.flag,
        })
    }

    /// Block until one in-flight classification completes. None when nothing is pending.
    pub fn next_completion(&mut self) -> Option<Classified> {
        if self.pending.is_empty() {
            return None;
        }
        let rx = self.done_rx.clone()?;
        loop {
            match rx.recv() {
                Ok(done) => {
                    if let Some(c) = self.complete(done) {
                        return Some(c);
                    }
                }
                Err(_) => return self.abandon_one(),
            }
        }
    }

    /// A completion that is already available, without blocking.
    pub fn try_next_completion(&mut self) -> Option<Classified> {
        let rx = self.done_rx.clone()?;
        while let Ok(done) = rx.try_recv() {
            if let Some(c) = self.complete(done) {
                return Some(c);
            }
        }
        None
    }

    /// Workers exited with work outstanding: hand back one entry as indeterminate.
    fn abandon_one(&mut self) -> Option<Classified> {
        let ticket = *self.pending.keys().next()?;
        let entry = self.pending.remove(&ticket)?;
        error!("No classification result for {}", entry.path);
        Some(Classified {
            entry,
            flag: ClassificationFlag::Indeterminate,
        })
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.job_tx.take();
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}
