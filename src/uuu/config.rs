//! The `uuu` configuration file.
//!
//! One directive per line: `[whitespace]<keyword>[whitespace]<argument>`.
//! Lines that are blank or start with `#` are ignored. The argument runs to
//! the end of the line and keeps any embedded or trailing whitespace, since
//! it is usually a path.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{JnsError, JnsResult};
use crate::paths::home_dir;
use crate::uuu::registry::Registry;

/// One parsed directive, used only for dispatch and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCommand {
    pub command: String,
    pub argument: String,
    pub file_name: String,
    pub line_num: usize,
}

impl ConfigCommand {
    /// Builds the error reported for this directive.
    pub fn error(&self, message: impl Into<String>) -> JnsError {
        JnsError::Config {
            file: self.file_name.clone(),
            line: self.line_num,
            command: self.command.clone(),
            message: message.into(),
        }
    }
}

/// The default configuration file, `~/.jns/uuu`.
pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".jns").join("uuu"))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    LeadingSpace,
    Keyword,
    Separator,
    Argument,
}

/// Splits a line into its keyword and argument.
///
/// Scanning stops at the end of the string or the first `\n`.
pub fn tokenize_line(line: &str) -> (String, String) {
    let mut keyword = String::new();
    let mut argument = String::new();
    let mut state = Scan::LeadingSpace;
    for ch in line.chars() {
        if ch == '\n' {
            break;
        }
        state = match (state, ch.is_whitespace()) {
            (Scan::LeadingSpace, true) => Scan::LeadingSpace,
            (Scan::LeadingSpace, false) | (Scan::Keyword, false) => {
                keyword.push(ch);
                Scan::Keyword
            }
            (Scan::Keyword, true) | (Scan::Separator, true) => Scan::Separator,
            (Scan::Separator, false) | (Scan::Argument, _) => {
                argument.push(ch);
                Scan::Argument
            }
        };
    }
    (keyword, argument)
}

/// Reads a configuration file into the registry's updater units.
pub struct ConfigFileReader {
    path: PathBuf,
}

impl ConfigFileReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses the file if it exists; a missing file is not an error.
    pub fn read_config_file(&self, registry: &mut Registry) -> JnsResult<bool> {
        if !self.path.is_file() {
            debug!(path = %self.path.display(), "no config file");
            return Ok(false);
        }
        let file = File::open(&self.path)?;
        let file_name = self.path.display().to_string();
        parse_config(BufReader::new(file), &file_name, registry)?;
        Ok(true)
    }
}

/// Parses every line of `reader`, dispatching directives to `registry`.
pub fn parse_config<R: BufRead>(reader: R, file_name: &str, registry: &mut Registry) -> JnsResult<()> {
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        parse_config_line(&line, file_name, idx + 1, registry)?;
    }
    Ok(())
}

/// Parses a single line (1-based `line_num`) and dispatches it.
pub fn parse_config_line(
    line: &str,
    file_name: &str,
    line_num: usize,
    registry: &mut Registry,
) -> JnsResult<()> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(());
    }
    let (command, argument) = tokenize_line(line);
    if command.is_empty() {
        return Ok(());
    }
    let ccmd = ConfigCommand {
        command,
        argument,
        file_name: file_name.to_string(),
        line_num,
    };
    match registry.find_for_command_mut(&ccmd.command) {
        Some(updater) => updater.update_opts_for_command(&ccmd),
        None => Err(ccmd.error("Invalid configuration command")),
    }
}
