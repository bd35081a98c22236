//! Error taxonomy shared by `kalp` and `uuu`.
//!
//! Every failure the library raises is a `JnsError`. The binaries map its
//! `ErrorKind` to a process exit code so the invoking shell can tell the
//! conditions apart.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library.
pub type JnsResult<T> = Result<T, JnsError>;

/// Coarse classification of a `JnsError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A caller broke an internal contract (a bug, not an environment problem).
    ContractViolation,
    /// The configuration file contains an unknown or incomplete directive.
    Config,
    /// A required file could not be located.
    NotFound,
    /// A declared input failed preflight validation.
    Validation,
    /// An external command could not be launched.
    Process,
    /// Anything else (I/O, runtime).
    Internal,
}

impl ErrorKind {
    /// Exit code surfaced to the invoking shell.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Internal => 1,
            ErrorKind::ContractViolation => 2,
            ErrorKind::Config => 3,
            ErrorKind::NotFound => 4,
            ErrorKind::Validation => 5,
            ErrorKind::Process => 6,
        }
    }
}

/// Errors raised by the supervision and update machinery.
#[derive(Debug, Error)]
pub enum JnsError {
    /// A watchdog was asked to start a process while one is still alive.
    #[error("watchdog \"{0}\" already has a running subprocess")]
    AlreadyRunning(String),

    /// A watchdog was started twice.
    #[error("watchdog \"{0}\" has already been started")]
    AlreadyStarted(String),

    /// Invalid directive in a configuration file.
    #[error("[{file}, line {line}] {message}: {command}")]
    Config {
        file: String,
        line: usize,
        command: String,
        message: String,
    },

    /// A file was not found in a directory or any of its ancestors.
    #[error("could not find \"{file}\" in {} or any parent directory", start.display())]
    NotFound { file: String, start: PathBuf },

    /// The top-level dependency manifest could not be parsed.
    #[error("failed to parse {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A declared option failed validation.
    #[error("{0}")]
    Validation(String),

    /// An external command could not be spawned.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A supervising task panicked or was cancelled.
    #[error("supervisor task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl JnsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JnsError::AlreadyRunning(_) | JnsError::AlreadyStarted(_) => {
                ErrorKind::ContractViolation
            }
            JnsError::Config { .. } => ErrorKind::Config,
            JnsError::NotFound { .. } => ErrorKind::NotFound,
            JnsError::Manifest { .. } | JnsError::Validation(_) => ErrorKind::Validation,
            JnsError::Spawn { .. } => ErrorKind::Process,
            JnsError::Join(_) | JnsError::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        JnsError::Validation(message.into())
    }
}

/// Picks the exit code for an error that reached a binary's `main`.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<JnsError>())
        .map(JnsError::exit_code)
        .unwrap_or(1)
}
