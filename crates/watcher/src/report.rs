//! Where decoded events and diagnostics go

use crate::decode::DecodeError;
use crate::event::Event;
use std::io::{self, Write};

/// Receives events in arrival order
pub trait EventSink: Send {
    /// Report one event
    fn report(&mut self, event: &Event) -> io::Result<()>;

    /// Report a non-fatal decoding anomaly
    fn diagnostic(&mut self, error: &DecodeError) -> io::Result<()>;
}

/// Writes one line per event to `out` and diagnostics to `err`
pub struct ConsoleSink<O, E> {
    out: O,
    err: E,
}

impl ConsoleSink<io::Stdout, io::Stderr> {
    /// Events to stdout, diagnostics to stderr
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> ConsoleSink<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self { out, err }
    }

    pub fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }
}

impl<O: Write + Send, E: Write + Send> EventSink for ConsoleSink<O, E> {
    fn report(&mut self, event: &Event) -> io::Result<()> {
        writeln!(self.out, "{}", event)?;
        self.out.flush()
    }

    fn diagnostic(&mut self, error: &DecodeError) -> io::Result<()> {
        writeln!(self.err, "{}", error)?;
        self.err.flush()
    }
}
