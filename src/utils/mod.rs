pub mod catwalk_toml;
pub mod config;
pub mod logger;
pub mod memory;

pub use config::*;
pub use logger::setup_logging;
pub use memory::reclaim_memory;
