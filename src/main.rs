//! catwalk CLI: catalogue a directory tree into CSV, resuming from the last checkpoint.

use anyhow::Result;
use catwalk::engine::arg_parser::Cli;
use catwalk::engine::handle_run;
use clap::Parser;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
