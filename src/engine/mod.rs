//! Engine: CLI, checkpoint storage, filesystem access, retry timing and path tools.

pub mod arg_parser;
pub mod cli;
pub mod db_ops;
pub mod fs_access;
pub mod progress;
pub mod retry;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::Cli;
pub use cli::{build_opts, handle_run};
pub use db_ops::{CheckpointStore, SqliteCheckpoint, open_db, open_db_in_memory};
pub use fs_access::{DirItem, FileStat, FileSystem, ListError, LocalFs, WalkIter, stat_with_retry};
pub use retry::{RecordingSleeper, Sleeper, ThreadSleeper, backoff_delay, jitter_delay};
pub use tools::{canonicalize, relative_to_root};
