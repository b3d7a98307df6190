//! Change sources: where raw batches come from

use crate::record::RawChangeBatch;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to start watching a path
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Access denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Failed to open directory handle for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl OpenError {
    /// Classify an I/O error raised while opening `path`
    pub fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => OpenError::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => OpenError::PermissionDenied(path.to_path_buf()),
            _ => OpenError::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Check that `path` exists and is a directory
    pub fn check_directory(path: &Path) -> Result<(), OpenError> {
        let metadata = std::fs::metadata(path).map_err(|e| Self::from_io(path, e))?;
        if metadata.is_dir() {
            Ok(())
        } else {
            Err(OpenError::NotADirectory(path.to_path_buf()))
        }
    }
}

/// Failure of a single `read_batch` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The OS had more changes than fit in the buffer; they were dropped
    #[error("change buffer overflowed, some changes were lost")]
    Overflow,

    /// The subscription ended; carries the last OS error code
    #[error("change source terminated with error code {0}")]
    Terminated(u32),
}

/// A blocking supplier of raw change batches
///
/// Implementations own whatever handle the subscription needs and release it
/// on drop.
pub trait ChangeSource: Send {
    /// Block until at least one change is available or the subscription ends
    fn read_batch(&mut self) -> Result<RawChangeBatch, SourceError>;
}

impl<S: ChangeSource + ?Sized> ChangeSource for Box<S> {
    fn read_batch(&mut self) -> Result<RawChangeBatch, SourceError> {
        (**self).read_batch()
    }
}

/// Replays a fixed script of batches and errors
///
/// Once the script is exhausted every read reports `Terminated(0)`.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<RawChangeBatch, SourceError>>,
}

impl ScriptedSource {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<RawChangeBatch, SourceError>>,
    {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn push_batch(&mut self, batch: RawChangeBatch) -> &mut Self {
        self.script.push_back(Ok(batch));
        self
    }

    pub fn push_error(&mut self, error: SourceError) -> &mut Self {
        self.script.push_back(Err(error));
        self
    }

    /// Reads left before the script runs out
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl ChangeSource for ScriptedSource {
    fn read_batch(&mut self) -> Result<RawChangeBatch, SourceError> {
        self.script
            .pop_front()
            .unwrap_or(Err(SourceError::Terminated(0)))
    }
}
