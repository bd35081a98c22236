//! Supervision of front-end build processes.

pub mod config;
pub mod events;
pub mod npm;
pub mod task;
pub mod watchdog;

pub use events::WatchdogEvent;
pub use task::{TaskSpec, WatchdogState};
pub use watchdog::{StopHandle, Watchdog, WatchdogSet};
