//! Helpers for running the `watchdir` binary
//!
//! Finite runs (argument and startup errors) go through `execute`. A live
//! watch never exits on its own, so `spawn` hands back a `LiveWatch` that
//! reads the child's output line by line and kills it on drop.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

/// CLI command builder with timing
pub struct WatchDirCommand {
    binary_path: PathBuf,
    args: Vec<String>,
}

impl WatchDirCommand {
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from(env!("CARGO_BIN_EXE_watchdir")),
            args: Vec::new(),
        }
    }

    /// Add command arguments
    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn arg_path(&mut self, path: &Path) -> &mut Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Run to completion and capture output with timing
    pub fn execute(&self) -> Result<CommandResult> {
        let start = Instant::now();

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .output()
            .context("Failed to execute command")?;

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: start.elapsed(),
        })
    }

    /// Execute and expect failure
    pub fn assert_failure(&self) -> Result<CommandResult> {
        let result = self.execute()?;

        if result.success() {
            anyhow::bail!(
                "Command should have failed but succeeded:\nArgs: {:?}\nStdout: {}",
                self.args,
                result.stdout
            );
        }

        Ok(result)
    }

    /// Start a watch that keeps running until the returned handle is dropped
    pub fn spawn(&self) -> Result<LiveWatch> {
        let mut child = Command::new(&self.binary_path)
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn command")?;

        let stdout = child.stdout.take().context("stdout not captured")?;
        let stderr = child.stderr.take().context("stderr not captured")?;

        Ok(LiveWatch {
            child,
            stdout: BufReader::new(stdout).lines(),
            stderr: BufReader::new(stderr).lines(),
        })
    }
}

/// A running `watchdir` process
pub struct LiveWatch {
    child: Child,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Lines<BufReader<ChildStderr>>,
}

impl LiveWatch {
    /// Block until stdout yields a line
    pub fn next_stdout_line(&mut self) -> Result<String> {
        self.stdout
            .next()
            .context("stdout closed")?
            .context("Failed to read stdout")
    }

    /// Block until a stderr line containing `needle` shows up
    pub fn wait_for_stderr(&mut self, needle: &str) -> Result<String> {
        for line in self.stderr.by_ref() {
            let line = line.context("Failed to read stderr")?;
            if line.contains(needle) {
                return Ok(line);
            }
        }
        anyhow::bail!("stderr closed before {:?} appeared", needle)
    }
}

impl Drop for LiveWatch {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Command execution result with timing
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Check if stdout contains text
    pub fn contains_stdout(&self, text: &str) -> bool {
        self.stdout.contains(text)
    }

    /// Check if stderr contains text
    pub fn contains_stderr(&self, text: &str) -> bool {
        self.stderr.contains(text)
    }
}
