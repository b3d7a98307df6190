//! Directory change watching
//!
//! This crate turns OS change notifications for a directory into a stream of
//! timestamped events:
//! - `source`: blocking change sources yielding raw record batches
//! - `record` / `decode`: the offset-chained record layout and its decoder,
//!   including rename-pair correlation
//! - `watch_loop`: the read → decode → report loop on a background thread
//! - `report`: sinks the events are written to

pub mod config;
pub mod decode;
pub mod event;
pub mod platform;
pub mod record;
pub mod report;
pub mod source;
pub mod watch_loop;

pub use config::WatchConfig;
pub use decode::{decode, DecodeError, Decoder};
pub use event::{Action, ChangeRecord, Event, EventKind};
pub use platform::{open, PlatformSource};
pub use record::{BatchBuilder, RawChangeBatch};
pub use report::{ConsoleSink, EventSink};
pub use source::{ChangeSource, OpenError, ScriptedSource, SourceError};
pub use watch_loop::{spawn, LoopOutcome, LoopState, LoopStats, WatchHandle, WatchLoop};
