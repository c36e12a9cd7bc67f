//! CLI command handler: merge config, set up logging and Ctrl+C, run, print the summary.

use anyhow::Result;
use colored::Colorize;
use log::{debug, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::catalog::catalog_dir;
use crate::engine::arg_parser::Cli;
use crate::engine::tools::{normalize_extensions, parse_list};
use crate::pipeline::{Classifier, PartitionOutcome, RunSummary, format_elapsed};
use crate::utils::catwalk_toml::{apply_file_to_opts, load_catwalk_toml};
use crate::utils::setup_logging;
use crate::Opts;

/// Overwrite opts field from the CLI when given.
macro_rules! apply_cli_opt {
    ($cli:expr, $opts:expr, $cli_field:ident => $opts_field:ident) => {
        if let Some(v) = $cli.$cli_field.clone() {
            $opts.$opts_field = v;
        }
    };
}

/// Defaults, then the config file, then CLI flags.
pub fn build_opts(cli: &Cli) -> Result<Opts> {
    let mut opts = Opts::default();
    if let Some(file) = load_catwalk_toml(cli.config.as_deref())? {
        apply_file_to_opts(&file, &mut opts)?;
    }
    apply_cli_opt!(cli, opts, root => root);
    apply_cli_opt!(cli, opts, out => out);
    apply_cli_opt!(cli, opts, state => state);
    if cli.log_file.is_some() {
        opts.log_file = cli.log_file.clone();
    }
    apply_cli_opt!(cli, opts, pdf_pages => max_pages);
    apply_cli_opt!(cli, opts, progress_every => progress_every);
    apply_cli_opt!(cli, opts, cache_every => cache_every);
    if let Some(ref s) = cli.include_ext {
        opts.include_ext = normalize_extensions(&parse_list(s));
    }
    if let Some(ref s) = cli.exclude_ext {
        opts.exclude_ext = normalize_extensions(&parse_list(s));
    }
    if let Some(ref s) = cli.document_ext {
        opts.document_ext = normalize_extensions(&parse_list(s));
    }
    if let Some(ref s) = cli.exclude_dirs {
        opts.exclude_dirs = parse_list(s);
    }
    if cli.limit.is_some() {
        opts.limit = cli.limit;
    }
    apply_cli_opt!(cli, opts, fresh => fresh);
    apply_cli_opt!(cli, opts, reset_state => reset_state);
    apply_cli_opt!(cli, opts, workers => workers);
    apply_cli_opt!(cli, opts, scan_mode => scan_mode);
    if let Some(ref s) = cli.partitions {
        opts.partitions = parse_list(s);
    }
    apply_cli_opt!(cli, opts, partition_column => partition_column);
    if let Some(ref s) = cli.rescan {
        opts.rescan = parse_list(s);
    }
    apply_cli_opt!(cli, opts, verbose => verbose);
    opts.workers = opts.workers.max(1);
    Ok(opts)
}

#[cfg(feature = "pdfium")]
fn pick_classifier(cli: &Cli) -> Arc<dyn Classifier> {
    use crate::pipeline::{PdfiumClassifier, UnavailableClassifier};
    match PdfiumClassifier::bind(cli.pdfium_dir.as_deref()) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            warn!("pdfium not available ({e:?}); documents will be left unclassified");
            Arc::new(UnavailableClassifier)
        }
    }
}

#[cfg(not(feature = "pdfium"))]
fn pick_classifier(_cli: &Cli) -> Arc<dyn Classifier> {
    warn!("Built without a PDF engine; documents will be left unclassified");
    Arc::new(crate::pipeline::UnavailableClassifier)
}

/// Ctrl+C stops new dispatch; in-flight work is drained and checkpointed.
fn install_cancel_handler() -> Option<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    match ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("Interrupted; finishing in-flight files (Ctrl+C again to quit now)");
    }) {
        Ok(()) => Some(flag),
        Err(e) => {
            warn!("Cannot install Ctrl+C handler: {}", e);
            None
        }
    }
}

fn print_summary(summary: &RunSummary, out: &Path) {
    println!("{}", "=".repeat(60));
    println!("{}", "Scan summary".bold());
    for p in &summary.partitions {
        let status = match &p.outcome {
            PartitionOutcome::Finished => "finished".green(),
            PartitionOutcome::Skipped(reason) => format!("skipped ({reason:?})").normal(),
            PartitionOutcome::Aborted(msg) => format!("aborted: {msg}").red(),
            PartitionOutcome::Halted => "halted".yellow(),
        };
        println!("  {:<24} {} | {}", p.id, status, p.tally);
    }
    let t = &summary.totals;
    println!(
        "Files processed: {} (skipped: {}, filtered: {}, errors: {})",
        t.processed, t.skipped, t.filtered, t.errors
    );
    println!(
        "Documents image-only (1): {}, with text (0): {}, indeterminate: {}",
        t.image_only, t.has_text, t.indeterminate
    );
    println!(
        "Elapsed: {} | average rate: {:.1} files/s | output: {}",
        format_elapsed(summary.elapsed),
        summary.rate(),
        out.display()
    );
}

/// Run one catalog pass with the merged options.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let mut opts = build_opts(cli)?;
    setup_logging(opts.verbose, opts.log_file.as_deref())?;
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );
    if opts.fresh {
        warn!("FRESH RUN: checkpoints are ignored and output files are rewritten.");
    }
    opts.cancel = install_cancel_handler();
    let classifier = pick_classifier(cli);
    let summary = catalog_dir(&opts, classifier)?;
    if summary.partitions.is_empty() {
        info!("Nothing to process");
    }
    print_summary(&summary, &opts.out);
    Ok(())
}
