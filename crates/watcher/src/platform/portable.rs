//! notify-backed change source for non-Windows platforms
//!
//! The watcher callback sends events through a crossbeam channel. Each
//! `read_batch` blocks for the first event, drains whatever else is already
//! queued and encodes the lot with `BatchBuilder`, so the decoder sees the
//! same chained records it would get from the Windows change journal.
//!
//! A rename's old and new halves always land in the same batch: records that
//! do not fit are carried to the next read, and a trailing old name moves
//! with them.

use crate::config::WatchConfig;
use crate::event::{Action, ChangeRecord};
use crate::record::{BatchBuilder, RawChangeBatch};
use crate::source::{ChangeSource, OpenError, SourceError};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// How long a batch ending in an old-name record waits for its partner
const RENAME_PARTNER_WAIT: Duration = Duration::from_millis(50);

/// A directory watched through `notify`
pub struct NotifySource {
    root: PathBuf,
    canonical_root: Option<PathBuf>,
    buffer_size: usize,
    rx: Receiver<notify::Result<Event>>,
    /// Records that did not fit in the previous batch
    carry: VecDeque<ChangeRecord>,
    /// Error seen after records were already drained; reported on the next read
    deferred: Option<SourceError>,
    _watcher: RecommendedWatcher,
}

impl NotifySource {
    pub fn open(config: &WatchConfig) -> Result<Self, OpenError> {
        OpenError::check_directory(&config.root)?;

        let (tx, rx) = crossbeam_channel::unbounded::<notify::Result<Event>>();
        let mut watcher = recommended_watcher(tx).map_err(|e| open_error(&config.root, e))?;

        let mode = if config.subtree {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&config.root, mode)
            .map_err(|e| open_error(&config.root, e))?;

        debug!(
            "Watching {} ({:?}, buffer {} bytes)",
            config.root.display(),
            mode,
            config.buffer_size
        );

        Ok(Self {
            root: config.root.clone(),
            canonical_root: std::fs::canonicalize(&config.root).ok(),
            buffer_size: config.buffer_size,
            rx,
            carry: VecDeque::new(),
            deferred: None,
            _watcher: watcher,
        })
    }

    /// Name of `path` relative to the watched root; `None` for the root itself
    fn relative_name(&self, path: &Path) -> Option<String> {
        let relative = path
            .strip_prefix(&self.root)
            .ok()
            .or_else(|| {
                self.canonical_root
                    .as_deref()
                    .and_then(|root| path.strip_prefix(root).ok())
            })
            .unwrap_or(path);

        if relative.as_os_str().is_empty() {
            None
        } else {
            Some(relative.to_string_lossy().into_owned())
        }
    }

    fn records_for(&self, event: &Event) -> Vec<ChangeRecord> {
        event
            .paths
            .iter()
            .filter_map(|path| {
                let action = action_for(&event.kind, path)?;
                let name = self.relative_name(path)?;
                Some(ChangeRecord { action, name })
            })
            .collect()
    }
}

impl ChangeSource for NotifySource {
    fn read_batch(&mut self) -> Result<RawChangeBatch, SourceError> {
        loop {
            if let Some(error) = self.deferred.take() {
                return Err(error);
            }

            let mut staging = Staging::new(self.buffer_size);

            let carried: Vec<ChangeRecord> = self.carry.drain(..).collect();
            if !staging.fill(carried, &mut self.carry) {
                if staging.is_empty() {
                    // A single record larger than the whole buffer
                    self.carry.pop_front();
                    return Err(SourceError::Overflow);
                }
                return Ok(staging.finish());
            }

            let mut next = if staging.is_empty() {
                Some(self.rx.recv().map_err(|_| SourceError::Terminated(0))?)
            } else {
                None
            };
            let mut waited_for_partner = false;

            loop {
                let item = match next.take() {
                    Some(item) => item,
                    None => match self.rx.try_recv() {
                        Ok(item) => item,
                        Err(TryRecvError::Empty) => {
                            // Give the new-name half of a rename a moment to arrive
                            if waited_for_partner || !staging.ends_with_old_name() {
                                break;
                            }
                            waited_for_partner = true;
                            match self.rx.recv_timeout(RENAME_PARTNER_WAIT) {
                                Ok(item) => item,
                                Err(RecvTimeoutError::Timeout) => break,
                                Err(RecvTimeoutError::Disconnected) => {
                                    self.deferred = Some(SourceError::Terminated(0));
                                    break;
                                }
                            }
                        }
                        Err(TryRecvError::Disconnected) => {
                            self.deferred = Some(SourceError::Terminated(0));
                            break;
                        }
                    },
                };

                let error = match item {
                    Ok(event) if event.need_rescan() => SourceError::Overflow,
                    Ok(event) => {
                        let records = self.records_for(&event);
                        if staging.fill(records, &mut self.carry) {
                            continue;
                        }
                        if !staging.is_empty() {
                            break;
                        }
                        self.carry.pop_front();
                        SourceError::Overflow
                    }
                    Err(e) => source_error(e),
                };

                if staging.is_empty() {
                    return Err(error);
                }
                self.deferred = Some(error);
                break;
            }

            if !staging.is_empty() {
                debug!("Encoded {} records into batch", staging.records.len());
                return Ok(staging.finish());
            }
            // Only unreported kinds arrived; wait for the next event
        }
    }
}

/// Records collected for one batch, encoded only once the batch is closed
///
/// Keeping them unencoded lets a trailing old-name record move to the next
/// batch together with its new-name partner.
#[derive(Debug)]
struct Staging {
    records: Vec<ChangeRecord>,
    len: usize,
    capacity: usize,
}

impl Staging {
    fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            len: 0,
            capacity,
        }
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn ends_with_old_name(&self) -> bool {
        matches!(self.records.last(), Some(r) if r.action == Action::RenamedOld)
    }

    /// Stage `records` while they fit; the rest go to `carry`
    ///
    /// A rename pair is never split across batches unless the pair alone
    /// fills the buffer.
    fn fill(&mut self, records: Vec<ChangeRecord>, carry: &mut VecDeque<ChangeRecord>) -> bool {
        let mut pending = records.into_iter();
        while let Some(record) = pending.next() {
            let needed = BatchBuilder::encoded_len(&record.name);
            if self.len + needed > self.capacity {
                let mut overflow: VecDeque<ChangeRecord> = VecDeque::new();
                if self.ends_with_old_name() && self.records.len() > 1 {
                    if let Some(old) = self.records.pop() {
                        self.len -= BatchBuilder::encoded_len(&old.name);
                        overflow.push_back(old);
                    }
                }
                overflow.push_back(record);
                overflow.extend(pending);
                overflow.append(carry);
                *carry = overflow;
                return false;
            }
            self.len += needed;
            self.records.push(record);
        }
        true
    }

    fn finish(self) -> RawChangeBatch {
        let mut builder = BatchBuilder::with_capacity(self.len);
        for record in &self.records {
            builder.push(record.action, &record.name);
        }
        builder.finish()
    }
}

/// Record action for a change to `path`; `None` for kinds that are not reported
///
/// Backends that cannot tell the two halves of a rename apart (FSEvents,
/// kqueue) report each path as `Name(Any)`. Those map to `Added` when the path
/// exists afterwards and `Removed` when it does not, so a rename there shows
/// up as a removal plus an addition rather than a paired rename.
pub fn action_for(kind: &EventKind, path: &Path) -> Option<Action> {
    match kind {
        EventKind::Create(_) => Some(Action::Added),
        EventKind::Remove(_) => Some(Action::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Action::RenamedOld),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(Action::RenamedNew),
        // Its From and To halves are delivered separately
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => None,
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.symlink_metadata().is_ok() {
                Some(Action::Added)
            } else {
                Some(Action::Removed)
            }
        }
        EventKind::Modify(_) => Some(Action::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

fn source_error(error: notify::Error) -> SourceError {
    match error.kind {
        notify::ErrorKind::MaxFilesWatch => {
            warn!("Watch limit reached; changes below new directories may be missed");
            SourceError::Overflow
        }
        notify::ErrorKind::Io(e) => SourceError::Terminated(e.raw_os_error().unwrap_or(0) as u32),
        other => {
            warn!("Watcher error: {:?}", other);
            SourceError::Terminated(0)
        }
    }
}

fn open_error(path: &Path, error: notify::Error) -> OpenError {
    match error.kind {
        notify::ErrorKind::PathNotFound => OpenError::NotFound(path.to_path_buf()),
        notify::ErrorKind::Io(e) => OpenError::from_io(path, e),
        other => OpenError::Io {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::Other, format!("{:?}", other)),
        },
    }
}
