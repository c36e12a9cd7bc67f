use anyhow::{Context, Result};
use colored::Colorize;
use env_logger::{Builder, Target};
use log::Level;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Initialise env_logger. With `log_file`, records are appended to that file (no colors)
/// instead of stderr. Safe to call more than once; later calls are ignored.
pub fn setup_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    use log::LevelFilter;

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = Builder::from_default_env();
    builder
        .filter_level(LevelFilter::Warn) // Default: only warnings from dependencies
        .filter_module(env!("CARGO_PKG_NAME"), level); // Our crate: use requested level

    match log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("create log directory {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            builder
                .target(Target::Pipe(Box::new(file)))
                .format(|buf, record| {
                    writeln!(
                        buf,
                        "{} [{}] {}: {}",
                        buf.timestamp_millis(),
                        record.level(),
                        record.target(),
                        record.args()
                    )
                });
        }
        None => {
            builder.format(|buf, record| {
                let name = env!("CARGO_PKG_NAME");
                let line = match record.level() {
                    Level::Error | Level::Warn => {
                        let level_str = match record.level() {
                            Level::Warn => "WARN".yellow(),
                            Level::Error => "ERROR".red(),
                            _ => unreachable!(),
                        };
                        let path = record.target().to_string().white();
                        format!("[{} {} {}] {}", name.cyan(), level_str, path, record.args())
                    }
                    _ => format!("[{}] {}", name.cyan(), record.args()),
                };
                writeln!(buf, "{}", line)
            });
        }
    }

    let _ = builder.try_init();
    Ok(())
}
