//! Configuration management for kalp.
//!
//! This module defines the structure of the optional `kalp.toml` file and
//! turns it (or the built-in `gulp watch` / `karma start` pair) into the
//! list of tasks to supervise.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::error::JnsError;
use crate::kalp::task::TaskSpec;
use crate::paths::find_file_up_hierarchy;

/// Name of the configuration file looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "kalp.toml";
/// File marking the directory `karma start` must run in.
pub const KARMA_CONF_FILE: &str = "karma.conf.js";
/// Install command used when the configuration does not name one.
pub const DEFAULT_INSTALL_CMD: &str = "npm install";

/// Top-level configuration structure corresponding to `kalp.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Default restart policy for tasks that do not set their own.
    pub keep_alive: Option<bool>,
    /// Command used to install missing dependencies (default: `npm install`).
    pub install_cmd: Option<String>,
    /// Skip the dependency check entirely.
    pub skip_install: Option<bool>,
    /// Tasks to supervise; replaces the built-in gulp/karma pair when present.
    #[serde(rename = "task", default)]
    pub tasks: Vec<TaskConfig>,
}

/// Configuration for a single supervised task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Display name of the task.
    pub name: String,
    /// Command to execute (split with shell quoting rules).
    pub cmd: String,
    /// Working directory, relative to the root.
    pub cwd: Option<String>,
    /// Whether to relaunch the task when it exits.
    pub keep_alive: Option<bool>,
    /// Run in the nearest ancestor directory containing this file.
    pub locate: Option<String>,
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

pub fn default_config_path() -> Option<PathBuf> {
    let path = Path::new(CONFIG_FILE_NAME);
    if path.is_file() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

/// Which of the built-in tasks to run for a root.
#[derive(Debug, Clone, Copy)]
pub struct DefaultTasks {
    pub gulp: bool,
    pub karma: bool,
}

/// Builds the task list for one root directory.
pub fn tasks_for_root(
    root: &Path,
    config: &Config,
    defaults: DefaultTasks,
    keep_alive: bool,
    dry_run: bool,
) -> Result<Vec<TaskSpec>> {
    let keep_alive = config.keep_alive.unwrap_or(true) && keep_alive;
    let mut specs = Vec::new();
    if config.tasks.is_empty() {
        if defaults.gulp {
            specs.push(TaskSpec::new("gulp", vec!["gulp".into(), "watch".into()], root));
        }
        if defaults.karma {
            let karma_dir = find_file_up_hierarchy(root, KARMA_CONF_FILE).ok_or_else(|| {
                JnsError::NotFound {
                    file: KARMA_CONF_FILE.to_string(),
                    start: root.to_path_buf(),
                }
            })?;
            specs.push(TaskSpec::new("karma", vec!["karma".into(), "start".into()], karma_dir));
        }
    } else {
        for task in &config.tasks {
            specs.push(spec_from_config(root, task)?);
        }
    }
    Ok(specs
        .into_iter()
        .map(|spec| {
            let task_keep_alive = spec.keep_alive;
            spec.keep_alive(keep_alive && task_keep_alive).dry_run(dry_run)
        })
        .collect())
}

fn spec_from_config(root: &Path, config: &TaskConfig) -> Result<TaskSpec> {
    let parts = shell_words::split(&config.cmd)
        .with_context(|| format!("failed to parse cmd for {}", config.name))?;
    if parts.is_empty() {
        return Err(anyhow!("empty cmd for {}", config.name));
    }
    let base = match &config.cwd {
        Some(cwd) => root.join(cwd),
        None => root.to_path_buf(),
    };
    let cwd = match &config.locate {
        Some(file) => find_file_up_hierarchy(&base, file).ok_or_else(|| JnsError::NotFound {
            file: file.clone(),
            start: base.clone(),
        })?,
        None => base,
    };
    Ok(TaskSpec::new(config.name.clone(), parts, cwd).keep_alive(config.keep_alive.unwrap_or(true)))
}

/// Splits the configured install command into argv form.
pub fn install_argv(config: &Config) -> Result<Vec<String>> {
    let raw = config.install_cmd.as_deref().unwrap_or(DEFAULT_INSTALL_CMD);
    let argv = shell_words::split(raw).context("failed to parse install_cmd")?;
    if argv.is_empty() {
        return Err(anyhow!("install_cmd is empty"));
    }
    Ok(argv)
}
