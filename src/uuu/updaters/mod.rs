//! The concrete updater units.

mod packages;
mod repo;
mod rustgit;
mod system;

pub use packages::{CabalUpdater, NpmUpdater, PipUpdater};
pub use repo::{subdirectories, update_repo, RepoDirUpdater, RepoKind, RepoUpdater};
pub use rustgit::{RustGitProject, RustGitUpdater};
pub use system::{AtomUpdater, ChocoUpdater, CygwinUpdater, InitJnsUpdater};
