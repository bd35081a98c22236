//! Data structures describing a supervised task.
//!
//! `TaskSpec` is the immutable description of one long-running command and
//! `WatchdogState` is the lifecycle state its supervisor moves through.

use std::path::PathBuf;

/// Specification for a process to be supervised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Friendly name for the task.
    pub name: String,
    /// The command executable.
    pub cmd: String,
    /// Arguments for the command.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: PathBuf,
    /// Whether to relaunch the process every time it exits.
    pub keep_alive: bool,
    /// Report the command without ever spawning it.
    pub dry_run: bool,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        let mut argv = argv.into_iter();
        let cmd = argv.next().unwrap_or_default();
        Self {
            name: name.into(),
            cmd,
            args: argv.collect(),
            cwd: cwd.into(),
            keep_alive: true,
            dry_run: false,
        }
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The command line as a single shell-quoted string, for display.
    pub fn display_command(&self) -> String {
        let argv = std::iter::once(self.cmd.as_str()).chain(self.args.iter().map(String::as_str));
        shell_words::join(argv)
    }
}

/// The lifecycle state of a watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Between spawns (initial state, or deciding whether to restart).
    Idle,
    /// A supervised process is alive.
    Running,
    /// Supervision has ended for good.
    Stopped,
}
