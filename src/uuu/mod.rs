//! `uuu`: update all the things.

pub mod config;
pub mod registry;
pub mod runner;
pub mod updater;
pub mod updaters;

pub use config::{ConfigCommand, ConfigFileReader};
pub use registry::Registry;
pub use runner::Runner;
pub use updater::{Platform, UpdateContext, Updater};
