//! Decoded change records and the events reported for them

use chrono::{DateTime, Local};
use std::fmt;

/// Timestamp layout used in report lines (C `ctime` without the newline)
pub const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Action carried by a single change record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Entry created
    Added,
    /// Entry deleted
    Removed,
    /// Entry contents or metadata changed
    Modified,
    /// First half of a rename pair
    RenamedOld,
    /// Second half of a rename pair
    RenamedNew,
    /// Unrecognized action code
    Other(u32),
}

impl Action {
    pub const ADDED: u32 = 1;
    pub const REMOVED: u32 = 2;
    pub const MODIFIED: u32 = 3;
    pub const RENAMED_OLD: u32 = 4;
    pub const RENAMED_NEW: u32 = 5;

    /// Map a raw action code onto an action
    pub fn from_code(code: u32) -> Self {
        match code {
            Self::ADDED => Action::Added,
            Self::REMOVED => Action::Removed,
            Self::MODIFIED => Action::Modified,
            Self::RENAMED_OLD => Action::RenamedOld,
            Self::RENAMED_NEW => Action::RenamedNew,
            other => Action::Other(other),
        }
    }

    /// Raw action code for this action
    pub fn code(self) -> u32 {
        match self {
            Action::Added => Self::ADDED,
            Action::Removed => Self::REMOVED,
            Action::Modified => Self::MODIFIED,
            Action::RenamedOld => Self::RENAMED_OLD,
            Action::RenamedNew => Self::RENAMED_NEW,
            Action::Other(code) => code,
        }
    }
}

/// One decoded change record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub action: Action,
    pub name: String,
}

/// What happened, with the name(s) involved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Added(String),
    Removed(String),
    Modified(String),
    Renamed { old: String, new: String },
}

impl EventKind {
    /// Column label used in report lines
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Added(_) => "Added",
            EventKind::Removed(_) => "Removed",
            EventKind::Modified(_) => "Modified",
            EventKind::Renamed { .. } => "Renamed",
        }
    }
}

/// A reported event, stamped with the moment it was decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub timestamp: DateTime<Local>,
}

impl Event {
    pub fn new(kind: EventKind, timestamp: DateTime<Local>) -> Self {
        Self { kind, timestamp }
    }
}

/// Formats the event as one report line (no trailing newline):
///
/// ```text
/// Fri Oct 16 09:41:07 2026        Renamed         "old.txt" -> "new.txt"
/// ```
impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}        {:<16}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.kind.label()
        )?;
        match &self.kind {
            EventKind::Added(name) | EventKind::Removed(name) | EventKind::Modified(name) => {
                write!(f, "\"{}\"", name)
            }
            EventKind::Renamed { old, new } => write!(f, "\"{}\" -> \"{}\"", old, new),
        }
    }
}
