//! The updater unit contract.
//!
//! Every kind of update (a git checkout, a pip package, Atom's plugins)
//! is one `Updater`. A unit contributes a command-line flag and a config
//! file keyword, accumulates the values given through either, validates
//! them, and finally issues command batches to the `Runner`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clap::{Arg, ArgMatches};

use crate::error::{JnsError, JnsResult};
use crate::paths::expand_home;
use crate::uuu::config::ConfigCommand;
use crate::uuu::runner::Runner;

/// The operating system family updates run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Cygwin,
    Darwin,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "cygwin") {
            Platform::Cygwin
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::Darwin
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Other
        }
    }

    pub fn is_windows_like(self) -> bool {
        matches!(self, Platform::Windows | Platform::Cygwin)
    }
}

/// Run-scoped settings threaded through every unit.
#[derive(Debug, Clone, Copy)]
pub struct UpdateContext {
    pub dry_run: bool,
    pub platform: Platform,
}

impl UpdateContext {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            platform: Platform::current(),
        }
    }

    pub fn on(platform: Platform, dry_run: bool) -> Self {
        Self { dry_run, platform }
    }
}

/// One pluggable update kind.
#[async_trait]
pub trait Updater: Send {
    /// The keyword this unit answers to in the configuration file.
    fn config_command(&self) -> &'static str;

    /// The command-line flag this unit contributes.
    fn cli_arg(&self) -> Arg;

    /// Folds the values parsed for `cli_arg` into this unit.
    fn update_opts_from_cli(&mut self, matches: &ArgMatches);

    /// Folds one configuration-file directive into this unit.
    fn update_opts_for_command(&mut self, ccmd: &ConfigCommand) -> JnsResult<()>;

    /// Preflight check of everything accumulated so far.
    fn validate_opts(&self, ctx: &UpdateContext) -> JnsResult<()>;

    fn is_root_required(&self, _ctx: &UpdateContext) -> bool {
        false
    }

    /// Human-readable `keyword:value` entries for the pending work.
    fn pending(&self) -> Vec<String>;

    /// Issues this unit's command batches.
    async fn update(&mut self, ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()>;

    fn is_config_command(&self, command: &str) -> bool {
        command.eq_ignore_ascii_case(self.config_command())
    }
}

fn require_argument(ccmd: &ConfigCommand, argtype: &str) -> JnsResult<()> {
    if ccmd.argument.is_empty() {
        return Err(ccmd.error(format!("Configuration command requires {}", argtype)));
    }
    Ok(())
}

/// Appends the directive's directory argument (with `~` expanded).
pub fn add_directory(ccmd: &ConfigCommand, directories: &mut Vec<PathBuf>) -> JnsResult<()> {
    require_argument(ccmd, "directory")?;
    directories.push(expand_home(&ccmd.argument));
    Ok(())
}

/// Returns the directive's file argument (with `~` expanded).
pub fn file_argument(ccmd: &ConfigCommand) -> JnsResult<PathBuf> {
    require_argument(ccmd, "file")?;
    Ok(expand_home(&ccmd.argument))
}

/// Appends the directive's argument verbatim.
pub fn add_argument(ccmd: &ConfigCommand, arguments: &mut Vec<String>) -> JnsResult<()> {
    require_argument(ccmd, "argument")?;
    arguments.push(ccmd.argument.clone());
    Ok(())
}

/// Collects the string values given for flag `id`.
pub fn cli_values(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

pub fn validate_is_directory(dir: &Path) -> JnsResult<()> {
    if !dir.exists() {
        return Err(JnsError::validation(format!(
            "Directory does not exist: {}",
            dir.display()
        )));
    }
    if !dir.is_dir() {
        return Err(JnsError::validation(format!(
            "Directory is not a directory: {}",
            dir.display()
        )));
    }
    Ok(())
}

pub fn validate_is_directories(dirs: &[PathBuf]) -> JnsResult<()> {
    dirs.iter().try_for_each(|dir| validate_is_directory(dir))
}

pub fn validate_is_file(file: &Path) -> JnsResult<()> {
    if !file.exists() {
        return Err(JnsError::validation(format!(
            "File does not exist: {}",
            file.display()
        )));
    }
    if !file.is_file() {
        return Err(JnsError::validation(format!(
            "File is not a file: {}",
            file.display()
        )));
    }
    Ok(())
}
