//! Version-control checkouts: explicit repositories (`git`, `svn`) and
//! directories of repositories (`gitd`, `svnd`).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clap::{Arg, ArgAction, ArgMatches};

use crate::error::JnsResult;
use crate::paths::expand_home;
use crate::uuu::config::ConfigCommand;
use crate::uuu::runner::Runner;
use crate::uuu::updater::{
    add_directory, cli_values, validate_is_directories, UpdateContext, Updater,
};

/// The version-control system behind a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoKind {
    Git,
    Svn,
}

impl RepoKind {
    pub fn name(self) -> &'static str {
        match self {
            RepoKind::Git => "git",
            RepoKind::Svn => "svn",
        }
    }

    /// The metadata directory marking a checkout.
    pub fn marker_dir(self) -> &'static str {
        match self {
            RepoKind::Git => ".git",
            RepoKind::Svn => ".svn",
        }
    }

    pub fn update_cmd(self) -> Vec<String> {
        let words: &[&str] = match self {
            RepoKind::Git => &["git", "pull"],
            RepoKind::Svn => &["svn", "update", "--non-interactive"],
        };
        words.iter().map(|word| word.to_string()).collect()
    }
}

/// Updates one checkout, or reports it skipped when it has no marker dir.
///
/// Each repository is its own batch, so one failing pull never stops the next.
pub async fn update_repo(runner: &mut Runner, directory: &Path, kind: RepoKind) -> JnsResult<i32> {
    if directory.join(kind.marker_dir()).exists() {
        let title = format!("updating {} repository: {}", kind.name(), directory.display());
        runner.run(&[kind.update_cmd()], directory, Some(&title)).await
    } else {
        let title = format!(
            "skipping {} repository with no {} directory: {}",
            kind.name(),
            kind.marker_dir(),
            directory.display()
        );
        runner.run(&[], directory, Some(&title)).await
    }
}

/// Immediate subdirectories of `dir`, sorted by name.
pub fn subdirectories(dir: &Path) -> JnsResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn repo_arg(id: &'static str, value_name: &'static str, help: String) -> Arg {
    Arg::new(id)
        .long(id)
        .action(ArgAction::Append)
        .value_name(value_name)
        .help(help)
}

fn cli_dirs(matches: &ArgMatches, id: &str) -> Vec<PathBuf> {
    cli_values(matches, id)
        .iter()
        .map(|dir| expand_home(dir))
        .collect()
}

/// An explicit list of checkouts.
#[derive(Debug)]
pub struct RepoUpdater {
    kind: RepoKind,
    repos: Vec<PathBuf>,
}

impl RepoUpdater {
    pub fn new(kind: RepoKind) -> Self {
        Self {
            kind,
            repos: Vec::new(),
        }
    }
}

#[async_trait]
impl Updater for RepoUpdater {
    fn config_command(&self) -> &'static str {
        self.kind.name()
    }

    fn cli_arg(&self) -> Arg {
        repo_arg(
            self.config_command(),
            "REPO",
            format!("Specify a {} repository to be updated", self.kind.name()),
        )
    }

    fn update_opts_from_cli(&mut self, matches: &ArgMatches) {
        self.repos.extend(cli_dirs(matches, self.config_command()));
    }

    fn update_opts_for_command(&mut self, ccmd: &ConfigCommand) -> JnsResult<()> {
        add_directory(ccmd, &mut self.repos)
    }

    fn validate_opts(&self, _ctx: &UpdateContext) -> JnsResult<()> {
        validate_is_directories(&self.repos)
    }

    fn pending(&self) -> Vec<String> {
        self.repos
            .iter()
            .map(|repo| format!("{}:{}", self.config_command(), repo.display()))
            .collect()
    }

    async fn update(&mut self, _ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()> {
        for repo in &self.repos {
            update_repo(runner, repo, self.kind).await?;
        }
        Ok(())
    }
}

/// Directories whose immediate subdirectories may be checkouts.
#[derive(Debug)]
pub struct RepoDirUpdater {
    kind: RepoKind,
    keyword: &'static str,
    repo_dirs: Vec<PathBuf>,
}

impl RepoDirUpdater {
    pub fn new(kind: RepoKind) -> Self {
        let keyword = match kind {
            RepoKind::Git => "gitd",
            RepoKind::Svn => "svnd",
        };
        Self {
            kind,
            keyword,
            repo_dirs: Vec::new(),
        }
    }
}

#[async_trait]
impl Updater for RepoDirUpdater {
    fn config_command(&self) -> &'static str {
        self.keyword
    }

    fn cli_arg(&self) -> Arg {
        repo_arg(
            self.keyword,
            "REPO_DIR",
            format!(
                "Specify a directory that may contain one or more {} repositories to be updated",
                self.kind.name()
            ),
        )
    }

    fn update_opts_from_cli(&mut self, matches: &ArgMatches) {
        self.repo_dirs.extend(cli_dirs(matches, self.keyword));
    }

    fn update_opts_for_command(&mut self, ccmd: &ConfigCommand) -> JnsResult<()> {
        add_directory(ccmd, &mut self.repo_dirs)
    }

    fn validate_opts(&self, _ctx: &UpdateContext) -> JnsResult<()> {
        validate_is_directories(&self.repo_dirs)
    }

    fn pending(&self) -> Vec<String> {
        self.repo_dirs
            .iter()
            .map(|dir| format!("{}:{}", self.keyword, dir.display()))
            .collect()
    }

    async fn update(&mut self, _ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()> {
        for repo_dir in &self.repo_dirs {
            for repo in subdirectories(repo_dir)? {
                update_repo(runner, &repo, self.kind).await?;
            }
        }
        Ok(())
    }
}
