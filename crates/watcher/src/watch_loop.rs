//! The read → decode → report loop
//!
//! One background thread owns the change source for its whole life and runs
//! the loop until the source reports termination. The controlling thread only
//! waits for it and collects the exit code.

use crate::decode::decode;
use crate::record::RawChangeBatch;
use crate::report::EventSink;
use crate::source::{ChangeSource, SourceError};
use std::io;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Name of the background thread running the loop
pub const THREAD_NAME: &str = "watch-loop";

/// Lifecycle of a watch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    /// Carries the source's terminal error code
    Stopped(u32),
}

/// Counters kept while the loop runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub batches: u64,
    pub events: u64,
    pub diagnostics: u64,
    pub overflows: u64,
}

/// What a finished loop hands back to its controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    pub exit_code: u32,
    pub stats: LoopStats,
}

/// Drives one change source into one sink
pub struct WatchLoop<S, K> {
    source: S,
    sink: K,
    state: LoopState,
    stats: LoopStats,
}

impl<S: ChangeSource, K: EventSink> WatchLoop<S, K> {
    pub fn new(source: S, sink: K) -> Self {
        Self {
            source,
            sink,
            state: LoopState::Starting,
            stats: LoopStats::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Run until the source terminates, returning its error code
    ///
    /// Blocks on the source with no timeout. Overflows are logged and the
    /// loop keeps reading.
    pub fn run(&mut self) -> u32 {
        if let LoopState::Stopped(code) = self.state {
            return code;
        }

        self.state = LoopState::Running;
        info!("Watch loop running");

        loop {
            match self.source.read_batch() {
                Ok(batch) => {
                    self.stats.batches += 1;
                    if let Err(e) = self.dispatch(&batch) {
                        error!("Failed to write report: {}", e);
                        return self.stop(0);
                    }
                }
                Err(SourceError::Overflow) => {
                    self.stats.overflows += 1;
                    warn!("Change buffer overflowed; some changes were not reported");
                }
                Err(SourceError::Terminated(code)) => return self.stop(code),
            }
        }
    }

    /// Decode one batch and report everything it yields, in order
    fn dispatch(&mut self, batch: &RawChangeBatch) -> io::Result<()> {
        debug!("Decoding batch of {} bytes", batch.len());

        for item in decode(batch) {
            match item {
                Ok(event) => {
                    self.sink.report(&event)?;
                    self.stats.events += 1;
                }
                Err(e) => {
                    debug!("Batch decoding stopped early: {:?}", e);
                    self.sink.diagnostic(&e)?;
                    self.stats.diagnostics += 1;
                }
            }
        }
        Ok(())
    }

    fn stop(&mut self, code: u32) -> u32 {
        self.state = LoopState::Stopped(code);
        info!(
            "Watch loop stopped with code {} ({} batches, {} events, {} diagnostics, {} overflows)",
            code,
            self.stats.batches,
            self.stats.events,
            self.stats.diagnostics,
            self.stats.overflows
        );
        code
    }

    pub fn outcome(&self) -> Option<LoopOutcome> {
        match self.state {
            LoopState::Stopped(exit_code) => Some(LoopOutcome {
                exit_code,
                stats: self.stats,
            }),
            _ => None,
        }
    }

    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }
}

/// Handle to a loop running on its own thread
#[derive(Debug)]
pub struct WatchHandle {
    thread: JoinHandle<LoopOutcome>,
}

impl WatchHandle {
    /// Wait for the loop to stop
    pub fn join(self) -> thread::Result<LoopOutcome> {
        self.thread.join()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Move `source` and `sink` onto a new thread and run the loop there
pub fn spawn<S, K>(source: S, sink: K) -> io::Result<WatchHandle>
where
    S: ChangeSource + 'static,
    K: EventSink + 'static,
{
    let thread = thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || {
            let mut watch = WatchLoop::new(source, sink);
            let exit_code = watch.run();
            LoopOutcome {
                exit_code,
                stats: watch.stats,
            }
        })?;

    Ok(WatchHandle { thread })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodeError;
    use crate::event::{Action, Event, EventKind};
    use crate::record::BatchBuilder;
    use crate::source::ScriptedSource;
    use std::sync::{Arc, Mutex};

    /// Captures everything reported, shareable across threads
    #[derive(Clone, Default)]
    struct RecordingSink {
        events: Arc<Mutex<Vec<EventKind>>>,
        diagnostics: Arc<Mutex<Vec<DecodeError>>>,
    }

    impl EventSink for RecordingSink {
        fn report(&mut self, event: &Event) -> io::Result<()> {
            self.events.lock().unwrap().push(event.kind.clone());
            Ok(())
        }

        fn diagnostic(&mut self, error: &DecodeError) -> io::Result<()> {
            self.diagnostics.lock().unwrap().push(error.clone());
            Ok(())
        }
    }

    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn report(&mut self, _event: &Event) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn diagnostic(&mut self, _error: &DecodeError) -> io::Result<()> {
            Ok(())
        }
    }

    fn batch(records: &[(Action, &str)]) -> RawChangeBatch {
        let mut builder = BatchBuilder::new();
        for (action, name) in records {
            builder.push(*action, name);
        }
        builder.finish()
    }

    #[test]
    fn test_terminated_stops_with_code() {
        let source = ScriptedSource::new([Err(SourceError::Terminated(5))]);
        let mut watch = WatchLoop::new(source, RecordingSink::default());
        assert_eq!(watch.state(), LoopState::Starting);
        assert_eq!(watch.outcome(), None);

        assert_eq!(watch.run(), 5);
        assert_eq!(watch.state(), LoopState::Stopped(5));
        assert_eq!(watch.outcome().unwrap().exit_code, 5);
    }

    #[test]
    fn test_events_reported_in_order_across_batches() {
        let sink = RecordingSink::default();
        let source = ScriptedSource::new([
            Ok(batch(&[(Action::Modified, "x"), (Action::Removed, "y")])),
            Ok(batch(&[
                (Action::RenamedOld, "old.txt"),
                (Action::RenamedNew, "new.txt"),
            ])),
            Ok(batch(&[(Action::Added, "a.txt")])),
        ]);

        let mut watch = WatchLoop::new(source, sink.clone());
        assert_eq!(watch.run(), 0);

        assert_eq!(
            *sink.events.lock().unwrap(),
            vec![
                EventKind::Modified("x".to_string()),
                EventKind::Removed("y".to_string()),
                EventKind::Renamed {
                    old: "old.txt".to_string(),
                    new: "new.txt".to_string(),
                },
                EventKind::Added("a.txt".to_string()),
            ]
        );
        assert_eq!(watch.stats().batches, 3);
        assert_eq!(watch.stats().events, 4);
    }

    #[test]
    fn test_overflow_is_recoverable() {
        let sink = RecordingSink::default();
        let source = ScriptedSource::new([
            Err(SourceError::Overflow),
            Ok(batch(&[(Action::Added, "after-overflow")])),
            Err(SourceError::Terminated(995)),
        ]);

        let mut watch = WatchLoop::new(source, sink.clone());
        assert_eq!(watch.run(), 995);
        assert_eq!(watch.stats().overflows, 1);
        assert_eq!(
            *sink.events.lock().unwrap(),
            vec![EventKind::Added("after-overflow".to_string())]
        );
    }

    #[test]
    fn test_unpaired_rename_does_not_stop_loop() {
        let sink = RecordingSink::default();
        let source = ScriptedSource::new([
            Ok(batch(&[(Action::RenamedOld, "z")])),
            Ok(batch(&[(Action::Added, "next")])),
        ]);

        let mut watch = WatchLoop::new(source, sink.clone());
        watch.run();

        assert_eq!(
            *sink.diagnostics.lock().unwrap(),
            vec![DecodeError::UnpairedRename {
                old_name: "z".to_string()
            }]
        );
        assert_eq!(
            *sink.events.lock().unwrap(),
            vec![EventKind::Added("next".to_string())]
        );
        assert_eq!(watch.stats().diagnostics, 1);
    }

    #[test]
    fn test_sink_failure_stops_loop() {
        let source = ScriptedSource::new([
            Ok(batch(&[(Action::Added, "a")])),
            Err(SourceError::Terminated(3)),
        ]);

        let mut watch = WatchLoop::new(source, BrokenSink);
        assert_eq!(watch.run(), 0);
        assert_eq!(watch.state(), LoopState::Stopped(0));

        // The scripted termination was never read
        let (source, _) = watch.into_parts();
        assert_eq!(source.remaining(), 1);
    }

    #[test]
    fn test_run_after_stop_returns_same_code() {
        let mut watch = WatchLoop::new(
            ScriptedSource::new([Err(SourceError::Terminated(2))]),
            RecordingSink::default(),
        );
        assert_eq!(watch.run(), 2);
        assert_eq!(watch.run(), 2);
    }

    #[test]
    fn test_spawned_loop_reports_outcome() {
        let sink = RecordingSink::default();
        let source = ScriptedSource::new([
            Ok(batch(&[(Action::Added, "a")])),
            Err(SourceError::Terminated(5)),
        ]);

        let handle = spawn(source, sink.clone()).unwrap();
        let outcome = handle.join().unwrap();

        assert_eq!(outcome.exit_code, 5);
        assert_eq!(outcome.stats.events, 1);
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }
}
