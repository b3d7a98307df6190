//! Common utilities for integration tests

// Not every test binary uses every helper
#[allow(dead_code)]
pub mod cli;

pub use cli::WatchDirCommand;
