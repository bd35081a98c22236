//! junk-n-stuff: developer workflow tools.
//!
//! The library backs two binaries:
//!
//! * `kalp` supervises long-running front-end build processes and restarts
//!   them when they exit, after making sure `npm install` is up to date.
//! * `uuu` updates repositories, package managers and plugin stores through
//!   an ordered registry of updater units.

pub mod error;
pub mod kalp;
pub mod logging;
pub mod paths;
pub mod uuu;

pub use error::{ErrorKind, JnsError, JnsResult};
