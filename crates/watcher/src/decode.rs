//! Batch decoding and rename correlation
//!
//! Walks the record chain of one batch and turns it into events. A rename is
//! reported by the OS as two records, old name then new name, and the new-name
//! record is assumed to be the one immediately after the old-name record. That
//! adjacency is what the notification mechanism has been observed to do; it is
//! not verified here. When the old-name record is the last one in the batch,
//! decoding stops with `DecodeError::UnpairedRename`.

use crate::event::{Action, Event, EventKind};
use crate::record::{LayoutError, RawChangeBatch, RawRecord};
use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::debug;

/// Clock used to stamp decoded events
pub type Clock = fn() -> DateTime<Local>;

/// Non-fatal anomalies found while decoding a batch
///
/// Each one ends decoding of the current batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Detected rename action for file: \"{old_name}\" but no paired new-name record was found")]
    UnpairedRename { old_name: String },

    #[error("Malformed change record at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: LayoutError },
}

/// Decode one batch into a lazy sequence of events
pub fn decode(batch: &RawChangeBatch) -> Decoder<'_> {
    Decoder::new(batch)
}

/// Iterator over the events of one batch
///
/// Single pass; fused once the last record is consumed or an error is yielded.
#[derive(Debug)]
pub struct Decoder<'a> {
    bytes: &'a [u8],
    cursor: Option<usize>,
    clock: Clock,
    pending_new_name: Option<String>,
}

impl<'a> Decoder<'a> {
    pub fn new(batch: &'a RawChangeBatch) -> Self {
        Self::with_clock(batch, Local::now)
    }

    pub fn with_clock(batch: &'a RawChangeBatch, clock: Clock) -> Self {
        let bytes = batch.as_bytes();
        Self {
            bytes,
            cursor: if bytes.is_empty() { None } else { Some(0) },
            clock,
            pending_new_name: None,
        }
    }

    /// New-name record seen without a preceding old-name record
    pub fn pending_new_name(&self) -> Option<&str> {
        self.pending_new_name.as_deref()
    }

    fn read(&mut self, offset: usize) -> Result<RawRecord<'a>, DecodeError> {
        RawRecord::parse(self.bytes, offset).map_err(|reason| {
            self.cursor = None;
            DecodeError::Malformed { offset, reason }
        })
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind, (self.clock)())
    }

    fn finish(&mut self) {
        self.cursor = None;
        if let Some(name) = &self.pending_new_name {
            debug!("Batch ended with unpaired new-name record: {:?}", name);
        }
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<Event, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let offset = self.cursor?;
            let record = match self.read(offset) {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };

            // A zero next offset is the only end-of-chain signal
            self.cursor = record.next_offset();

            let kind = match record.action() {
                Action::Added => EventKind::Added(record.name()),
                Action::Removed => EventKind::Removed(record.name()),
                Action::Modified => EventKind::Modified(record.name()),
                Action::RenamedNew => {
                    self.pending_new_name = Some(record.name());
                    if self.cursor.is_none() {
                        self.finish();
                    }
                    continue;
                }
                Action::RenamedOld => {
                    let old = record.name();
                    let Some(partner_offset) = self.cursor else {
                        self.finish();
                        return Some(Err(DecodeError::UnpairedRename { old_name: old }));
                    };

                    let partner = match self.read(partner_offset) {
                        Ok(partner) => partner,
                        Err(e) => return Some(Err(e)),
                    };
                    if partner.action() != Action::RenamedNew {
                        debug!(
                            "Pairing {:?} with adjacent {:?} record at offset {}",
                            old,
                            partner.action(),
                            partner_offset
                        );
                    }

                    self.cursor = partner.next_offset();
                    EventKind::Renamed {
                        old,
                        new: partner.name(),
                    }
                }
                Action::Other(code) => {
                    debug!("Skipping record with unknown action {} at offset {}", code, offset);
                    if self.cursor.is_none() {
                        self.finish();
                    }
                    continue;
                }
            };

            if self.cursor.is_none() {
                self.finish();
            }
            return Some(Ok(self.event(kind)));
        }
    }
}

impl std::iter::FusedIterator for Decoder<'_> {}
