//! Language package managers: pip, pip3, cabal and global npm packages.

use std::path::Path;

use async_trait::async_trait;
use clap::{Arg, ArgAction, ArgMatches};

use crate::error::JnsResult;
use crate::uuu::config::ConfigCommand;
use crate::uuu::runner::Runner;
use crate::uuu::updater::{add_argument, cli_values, Platform, UpdateContext, Updater};

fn package_arg(id: &'static str, value_name: &'static str, manager: &str) -> Arg {
    Arg::new(id)
        .long(id)
        .action(ArgAction::Append)
        .value_name(value_name)
        .help(format!("Specify a {} package to be updated", manager))
}

fn pending_packages(keyword: &str, packages: &[String]) -> Vec<String> {
    packages
        .iter()
        .map(|package| format!("{}:{}", keyword, package))
        .collect()
}

fn words(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| word.to_string()).collect()
}

/// `pip install --upgrade`, once per package (also used for `pip3`).
#[derive(Debug)]
pub struct PipUpdater {
    executable: &'static str,
    packages: Vec<String>,
}

impl PipUpdater {
    pub fn pip() -> Self {
        Self {
            executable: "pip",
            packages: Vec::new(),
        }
    }

    pub fn pip3() -> Self {
        Self {
            executable: "pip3",
            packages: Vec::new(),
        }
    }
}

#[async_trait]
impl Updater for PipUpdater {
    fn config_command(&self) -> &'static str {
        self.executable
    }

    fn cli_arg(&self) -> Arg {
        let value_name = if self.executable == "pip3" { "PIP3_PKG" } else { "PIP_PKG" };
        package_arg(self.executable, value_name, self.executable)
    }

    fn update_opts_from_cli(&mut self, matches: &ArgMatches) {
        self.packages.extend(cli_values(matches, self.executable));
    }

    fn update_opts_for_command(&mut self, ccmd: &ConfigCommand) -> JnsResult<()> {
        add_argument(ccmd, &mut self.packages)
    }

    fn validate_opts(&self, _ctx: &UpdateContext) -> JnsResult<()> {
        Ok(())
    }

    fn pending(&self) -> Vec<String> {
        pending_packages(self.executable, &self.packages)
    }

    async fn update(&mut self, _ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()> {
        for package in &self.packages {
            let cmd = vec![
                self.executable.to_string(),
                "install".to_string(),
                "--upgrade".to_string(),
                package.clone(),
            ];
            let title = format!("updating {} package: {}", self.executable, package);
            runner.run(&[cmd], Path::new("."), Some(&title)).await?;
        }
        Ok(())
    }
}

/// `cabal install`, refreshing the package index before the first package.
#[derive(Debug, Default)]
pub struct CabalUpdater {
    packages: Vec<String>,
    index_refreshed: bool,
}

impl CabalUpdater {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Updater for CabalUpdater {
    fn config_command(&self) -> &'static str {
        "cabal"
    }

    fn cli_arg(&self) -> Arg {
        package_arg("cabal", "CABAL_PKG", "cabal")
    }

    fn update_opts_from_cli(&mut self, matches: &ArgMatches) {
        self.packages.extend(cli_values(matches, "cabal"));
    }

    fn update_opts_for_command(&mut self, ccmd: &ConfigCommand) -> JnsResult<()> {
        add_argument(ccmd, &mut self.packages)
    }

    fn validate_opts(&self, _ctx: &UpdateContext) -> JnsResult<()> {
        Ok(())
    }

    fn pending(&self) -> Vec<String> {
        pending_packages("cabal", &self.packages)
    }

    async fn update(&mut self, _ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()> {
        for package in &self.packages {
            let mut cmds = Vec::new();
            if !self.index_refreshed {
                cmds.push(words(&["cabal", "update"]));
                self.index_refreshed = true;
            }
            cmds.push(vec!["cabal".to_string(), "install".to_string(), package.clone()]);
            let title = format!("updating cabal package: {}", package);
            runner.run(&cmds, Path::new("."), Some(&title)).await?;
        }
        Ok(())
    }
}

/// `npm update -g` for every requested package in one batch.
#[derive(Debug, Default)]
pub struct NpmUpdater {
    packages: Vec<String>,
}

impl NpmUpdater {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Updater for NpmUpdater {
    fn config_command(&self) -> &'static str {
        "npm"
    }

    fn cli_arg(&self) -> Arg {
        package_arg("npm", "NPM_PKG", "global npm")
    }

    fn update_opts_from_cli(&mut self, matches: &ArgMatches) {
        self.packages.extend(cli_values(matches, "npm"));
    }

    fn update_opts_for_command(&mut self, ccmd: &ConfigCommand) -> JnsResult<()> {
        add_argument(ccmd, &mut self.packages)
    }

    fn validate_opts(&self, _ctx: &UpdateContext) -> JnsResult<()> {
        Ok(())
    }

    fn is_root_required(&self, _ctx: &UpdateContext) -> bool {
        !self.packages.is_empty()
    }

    fn pending(&self) -> Vec<String> {
        pending_packages("npm", &self.packages)
    }

    async fn update(&mut self, ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()> {
        if self.packages.is_empty() {
            return Ok(());
        }
        let mut cmd = if ctx.platform == Platform::Linux {
            words(&["sudo"])
        } else {
            Vec::new()
        };
        cmd.extend(words(&["npm", "update", "-g"]));
        cmd.extend(self.packages.iter().cloned());
        let title = format!("updating npm packages: {}", self.packages.join(", "));
        runner.run(&[cmd], Path::new("."), Some(&title)).await?;
        Ok(())
    }
}
