//! Watch configuration

use std::path::PathBuf;

/// Default change buffer: room for 4096 minimal 16-byte records
pub const DEFAULT_BUFFER_SIZE: usize = 4096 * 16;

/// Smallest buffer accepted
pub const MIN_BUFFER_SIZE: usize = 1024;

/// What to watch and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Directory whose contents are watched (the directory itself is not)
    pub root: PathBuf,

    /// Cover the whole subtree rather than only direct entries
    pub subtree: bool,

    /// Bytes available to one batch
    pub buffer_size: usize,
}

impl WatchConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            subtree: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_subtree(mut self, subtree: bool) -> Self {
        self.subtree = subtree;
        self
    }

    /// Set the batch buffer size, clamped to `MIN_BUFFER_SIZE`
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(MIN_BUFFER_SIZE);
        self
    }
}
