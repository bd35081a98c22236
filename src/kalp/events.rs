//! Lifecycle events reported by watchdogs.
//!
//! Supervisors push these onto an mpsc channel; the `kalp` entry point
//! drains it and prints one line per event.

/// Something that happened to a supervised task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// Supervision of a task is beginning.
    Starting { id: usize, command: String },
    /// A process was spawned.
    Started { id: usize, pid: u32 },
    /// The supervised process exited (None usually implies signal termination).
    Exited { id: usize, code: Option<i32> },
    /// The process exited and is about to be launched again.
    Restarting { id: usize, command: String },
    /// A terminate signal was sent to the live process.
    Signaled { id: usize, pid: u32 },
    /// Dry run: the command that would have been supervised.
    DryRun { id: usize, command: String },
    /// Supervision has ended.
    Stopped { id: usize },
}

impl WatchdogEvent {
    pub fn id(&self) -> usize {
        match self {
            WatchdogEvent::Starting { id, .. }
            | WatchdogEvent::Started { id, .. }
            | WatchdogEvent::Exited { id, .. }
            | WatchdogEvent::Restarting { id, .. }
            | WatchdogEvent::Signaled { id, .. }
            | WatchdogEvent::DryRun { id, .. }
            | WatchdogEvent::Stopped { id } => *id,
        }
    }
}
