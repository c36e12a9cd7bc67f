//! Pipeline components: walk, classification dispatch, sink, and the partition driver.

pub mod classify;
pub mod context;
pub mod dispatch;
pub mod error_handler;
pub mod orchestrator;
pub mod walk;
pub mod writer;

#[cfg(feature = "pdfium")]
pub use classify::PdfiumClassifier;
pub use classify::{Classifier, ClassifyError, UnavailableClassifier, classify_with_fallback};
pub use context::{
    PartitionOutcome, PartitionReport, RunContext, RunSummary, SkipReason, Tally, format_elapsed,
};
pub use dispatch::{Classified, Dispatcher, Submitted};
pub use error_handler::record_error;
pub use orchestrator::{AGGREGATE_ID, Orchestrator};
pub use walk::{WalkItem, WalkedPath, Walker};
pub use writer::{RecordWriter, catalog_row, create_sink, header_row};
