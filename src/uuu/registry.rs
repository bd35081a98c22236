//! The ordered set of updater units.
//!
//! The registry is built once per run. Order matters: it fixes both the
//! order in which units update and the order in which configuration
//! keywords are matched.

use clap::{ArgMatches, Command};
use tracing::debug;

use crate::error::JnsResult;
use crate::uuu::runner::Runner;
use crate::uuu::updater::{UpdateContext, Updater};
use crate::uuu::updaters::{
    AtomUpdater, CabalUpdater, ChocoUpdater, CygwinUpdater, InitJnsUpdater, NpmUpdater,
    PipUpdater, RepoDirUpdater, RepoKind, RepoUpdater, RustGitUpdater,
};

pub struct Registry {
    updaters: Vec<Box<dyn Updater>>,
}

impl Registry {
    /// Every known unit, in update order.
    pub fn standard() -> Self {
        Self::from_updaters(vec![
            Box::new(RepoDirUpdater::new(RepoKind::Git)),
            Box::new(CabalUpdater::new()),
            Box::new(RepoUpdater::new(RepoKind::Git)),
            Box::new(RepoDirUpdater::new(RepoKind::Svn)),
            Box::new(RepoUpdater::new(RepoKind::Svn)),
            Box::new(PipUpdater::pip()),
            Box::new(PipUpdater::pip3()),
            Box::new(NpmUpdater::new()),
            Box::new(RustGitUpdater::new()),
            Box::new(InitJnsUpdater::new()),
            Box::new(ChocoUpdater::new()),
            Box::new(CygwinUpdater::new()),
            Box::new(AtomUpdater::new()),
        ])
    }

    pub fn from_updaters(updaters: Vec<Box<dyn Updater>>) -> Self {
        Self { updaters }
    }

    /// The units' keywords, in registry order.
    pub fn keywords(&self) -> Vec<&'static str> {
        self.updaters
            .iter()
            .map(|updater| updater.config_command())
            .collect()
    }

    /// Every unit's pending `keyword:value` entries, in registry order.
    pub fn pending(&self) -> Vec<String> {
        self.updaters
            .iter()
            .flat_map(|updater| updater.pending())
            .collect()
    }

    /// Adds every unit's flag to `cmd`.
    pub fn augment_command(&self, cmd: Command) -> Command {
        self.updaters
            .iter()
            .fold(cmd, |cmd, updater| cmd.arg(updater.cli_arg()))
    }

    pub fn apply_matches(&mut self, matches: &ArgMatches) {
        for updater in &mut self.updaters {
            updater.update_opts_from_cli(matches);
        }
    }

    /// The first unit (in registry order) answering to `command`, ignoring case.
    pub fn find_for_command_mut(&mut self, command: &str) -> Option<&mut Box<dyn Updater>> {
        self.updaters
            .iter_mut()
            .find(|updater| updater.is_config_command(command))
    }

    /// Validates every unit, stopping at the first failure.
    pub fn validate_all(&self, ctx: &UpdateContext) -> JnsResult<()> {
        self.updaters
            .iter()
            .try_for_each(|updater| updater.validate_opts(ctx))
    }

    pub fn is_root_required(&self, ctx: &UpdateContext) -> bool {
        self.updaters
            .iter()
            .any(|updater| updater.is_root_required(ctx))
    }

    /// Names of the units that will need root privileges.
    pub fn root_requirers(&self, ctx: &UpdateContext) -> Vec<&'static str> {
        self.updaters
            .iter()
            .filter(|updater| updater.is_root_required(ctx))
            .map(|updater| updater.config_command())
            .collect()
    }

    /// Runs every unit in order.
    ///
    /// Prints `no updates specified` when no unit ran anything.
    pub async fn update_all(&mut self, ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()> {
        for updater in &mut self.updaters {
            debug!(unit = updater.config_command(), "updating");
            updater.update(ctx, runner).await?;
        }
        if runner.run_count() == 0 {
            println!("no updates specified");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::uuu::config::parse_config;
    use crate::uuu::runner::tests::{argv, RecordingExecutor};
    use crate::uuu::updater::Platform;
    use std::collections::HashSet;
    use std::io::Cursor;

    pub(crate) fn pending(registry: &Registry) -> Vec<String> {
        registry.pending()
    }

    fn recording_runner() -> (Runner, RecordingExecutor) {
        let executor = RecordingExecutor::default();
        (
            Runner::with_executor(false, false, Box::new(executor.clone())),
            executor,
        )
    }

    #[test]
    fn standard_order_and_unique_keywords() {
        let registry = Registry::standard();
        let keywords = registry.keywords();
        assert_eq!(
            keywords,
            vec![
                "gitd", "cabal", "git", "svnd", "svn", "pip", "pip3", "npm", "rustgit",
                "init-jns", "choco", "cygwin", "atom",
            ]
        );
        let unique: HashSet<&str> = keywords.iter().copied().collect();
        assert_eq!(unique.len(), keywords.len());
    }

    #[test]
    fn cli_flags_reach_units() {
        let mut registry = Registry::standard();
        let matches = registry
            .augment_command(Command::new("uuu"))
            .try_get_matches_from(["uuu", "--pip", "requests", "--atom", "--npm", "gulp-cli"])
            .unwrap();
        registry.apply_matches(&matches);
        assert_eq!(
            pending(&registry),
            vec!["pip:requests", "npm:gulp-cli", "atom:true"]
        );
        assert!(registry.is_root_required(&UpdateContext::on(Platform::Linux, false)));
        assert_eq!(
            registry.root_requirers(&UpdateContext::on(Platform::Linux, false)),
            vec!["npm"]
        );
    }

    #[test]
    fn validation_fails_fast() {
        let mut registry = Registry::standard();
        let config = "git /definitely/not/here-4c2e\nchoco\n";
        parse_config(Cursor::new(config), "uuu", &mut registry).unwrap();
        let err = registry
            .validate_all(&UpdateContext::on(Platform::Linux, false))
            .unwrap_err();
        assert!(err.to_string().starts_with("Directory does not exist"));
    }

    #[tokio::test]
    async fn nothing_to_do() {
        let mut registry = Registry::standard();
        let (mut runner, executor) = recording_runner();
        registry
            .update_all(&UpdateContext::on(Platform::Linux, false), &mut runner)
            .await
            .unwrap();
        assert_eq!(runner.run_count(), 0);
        assert!(executor.commands().is_empty());
    }

    #[tokio::test]
    async fn units_update_in_registry_order() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        let mut registry = Registry::standard();
        let config = format!("atom\npip3 black\ngit {}\ncabal hlint\n", tmp.path().display());
        parse_config(Cursor::new(config), "uuu", &mut registry).unwrap();

        let (mut runner, executor) = recording_runner();
        registry
            .update_all(&UpdateContext::on(Platform::Linux, false), &mut runner)
            .await
            .unwrap();
        assert_eq!(
            executor.commands(),
            vec![
                argv(&["cabal", "update"]),
                argv(&["cabal", "install", "hlint"]),
                argv(&["git", "pull"]),
                argv(&["pip3", "install", "--upgrade", "black"]),
                argv(&["apm", "update", "--no-confirm"]),
            ]
        );
    }

    #[tokio::test]
    async fn dry_run_reports_without_executing() {
        let mut registry = Registry::standard();
        parse_config(Cursor::new("choco\ninit-jns\n"), "uuu", &mut registry).unwrap();
        let ctx = UpdateContext::on(Platform::Linux, true);
        registry.validate_all(&ctx).unwrap();

        let executor = RecordingExecutor::default();
        let mut runner = Runner::with_executor(true, false, Box::new(executor.clone()));
        registry.update_all(&ctx, &mut runner).await.unwrap();
        assert_eq!(runner.run_count(), 2);
        assert!(executor.commands().is_empty());
    }
}
