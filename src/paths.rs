//! Filesystem helpers shared by both tools.

use std::env;
use std::path::{Path, PathBuf};

/// Returns the current user's home directory, if one is configured.
pub fn home_dir() -> Option<PathBuf> {
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return Some(PathBuf::from(home));
        }
    }
    if cfg!(windows) {
        return env::var("USERPROFILE").ok().map(PathBuf::from);
    }
    None
}

/// Expands a leading `~`, `~/` or `~\` to the home directory.
///
/// Anything else (including `~user`) is returned untouched.
pub fn expand_home(raw: &str) -> PathBuf {
    let rest = if raw == "~" {
        Some("")
    } else if raw.starts_with("~/") || raw.starts_with("~\\") {
        Some(&raw[1..])
    } else {
        None
    };
    match (rest, home_dir()) {
        (Some(rest), Some(home)) => {
            let mut expanded = home.into_os_string();
            expanded.push(rest);
            PathBuf::from(expanded)
        }
        _ => PathBuf::from(raw),
    }
}

/// Walks from `root` up through its ancestors and returns the first
/// directory that contains `file`.
pub fn find_file_up_hierarchy(root: &Path, file: &str) -> Option<PathBuf> {
    root.ancestors()
        .find(|dir| dir.join(file).exists())
        .map(Path::to_path_buf)
}
