//! catwalk: resumable file catalog for large, slow directory trees.
//!
//! Walks a tree partition by partition, writes one CSV row per file, flags PDFs as
//! image-only or text, and keeps fingerprints in SQLite so an interrupted run picks up
//! where it stopped.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use catalog::catalog_dir;
pub use error::{CatalogError, CheckpointError, InvalidPath};
pub use pipeline::{
    Classifier, ClassifyError, PartitionOutcome, RunSummary, SkipReason, Tally,
    UnavailableClassifier,
};

/// Result alias used by public catwalk API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
