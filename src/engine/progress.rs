//! Progress bar utilities for displaying processing status

use kdam::{Animation, Bar, BarExt};

/// Create a counter for unknown total (shows count without percentage)
pub fn create_counter(desc: &str) -> Bar {
    kdam::tqdm!(
        total = 0,
        desc = desc.to_string(),
        animation = Animation::Classic,
        position = 0,
        unit = " files"
    )
}

/// Advance the bar by `n`; display errors are ignored.
pub fn update_progress_bar(pb: &mut Option<Bar>, n: usize) {
    if let Some(bar) = pb.as_mut() {
        let _ = bar.update(n);
    }
}

/// Change the label (e.g. to the partition being walked).
pub fn set_bar_desc(pb: &mut Option<Bar>, desc: &str) {
    if let Some(bar) = pb.as_mut() {
        bar.set_description(desc);
        let _ = bar.refresh();
    }
}

/// Print a newline after the bar so log lines start clean.
pub fn finish_bar(pb: &mut Option<Bar>) {
    if let Some(bar) = pb.as_mut() {
        let _ = bar.refresh();
        eprintln!();
    }
}
