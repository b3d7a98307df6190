//! WatchDir command line: argument parsing, logging setup and the watch run

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, Level};
use watcher::config::{DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
use watcher::{ChangeSource, ConsoleSink, EventSink, WatchConfig};

/// One-line description shown in help and after usage errors
pub const ABOUT: &str =
    "Watches directory for file changes. This does not include changes to the directory itself!";

/// WatchDir - log every change under a directory
#[derive(Parser, Debug)]
#[command(name = "watchdir")]
#[command(author, version, about = ABOUT, long_about = None)]
pub struct Cli {
    /// Directory to watch ([drive:][path])
    pub path: PathBuf,

    /// Bytes available to one batch of change records
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_BUFFER_SIZE,
          value_parser = parse_buffer_size)]
    pub buffer_size: usize,

    /// Watch only the directory's direct entries, not its whole subtree
    #[arg(long)]
    pub no_subtree: bool,

    /// Log more on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn config(&self) -> WatchConfig {
        WatchConfig::new(&self.path)
            .with_subtree(!self.no_subtree)
            .with_buffer_size(self.buffer_size)
    }

    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

fn parse_buffer_size(value: &str) -> std::result::Result<usize, String> {
    let size: usize = value
        .parse()
        .map_err(|_| format!("`{}` is not a byte count", value))?;
    if size < MIN_BUFFER_SIZE {
        return Err(format!("must be at least {} bytes", MIN_BUFFER_SIZE));
    }
    Ok(size)
}

/// Send logs to stderr so stdout carries only the event log
pub fn init_tracing(level: Level) {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Watch until the change source terminates and return its error code
///
/// Failing to open the directory is the only error; it happens before the
/// background thread starts.
pub fn run(cli: &Cli) -> Result<u32> {
    let config = cli.config();

    let source = watcher::open(&config)
        .with_context(|| format!("Failed to watch {}", config.root.display()))?;
    info!("Watching {}", config.root.display());

    run_with(source, ConsoleSink::stdio())
}

/// Run the watch loop for an already open source on its own thread and wait
/// for it to stop
pub fn run_with<S, K>(source: S, sink: K) -> Result<u32>
where
    S: ChangeSource + 'static,
    K: EventSink + 'static,
{
    let handle = watcher::spawn(source, sink).context("Failed to start watch thread")?;

    let outcome = handle
        .join()
        .map_err(|_| anyhow!("Watch thread panicked"))?;

    Ok(outcome.exit_code)
}

/// Report how the run ended and pick the process exit status
///
/// A stopped watch is a normal shutdown: its code goes to `out` and the
/// status is 0. Startup failures go to `err` with status 1.
pub fn finish<O: Write, E: Write>(result: Result<u32>, out: &mut O, err: &mut E) -> u8 {
    match result {
        Ok(code) => {
            let _ = writeln!(out, "Watcher stopped with error code: {}", code);
            let _ = out.flush();
            0
        }
        Err(e) => {
            let _ = writeln!(err, "Error: {:#}", e);
            let _ = err.flush();
            1
        }
    }
}
