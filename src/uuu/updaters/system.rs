//! Whole-system and tool updates toggled by a flag: Atom plugins,
//! Chocolatey, Cygwin and `init-jns`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clap::{Arg, ArgAction, ArgMatches};

use crate::error::{JnsError, JnsResult};
use crate::paths::expand_home;
use crate::uuu::config::ConfigCommand;
use crate::uuu::runner::Runner;
use crate::uuu::updater::{file_argument, validate_is_file, Platform, UpdateContext, Updater};

fn flag_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id).long(id).action(ArgAction::SetTrue).help(help)
}

fn pending_flag(keyword: &str, enabled: bool) -> Vec<String> {
    if enabled {
        vec![format!("{}:true", keyword)]
    } else {
        Vec::new()
    }
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| word.to_string()).collect()
}

/// `apm update` for Atom's packages.
#[derive(Debug, Default)]
pub struct AtomUpdater {
    enabled: bool,
}

impl AtomUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(platform: Platform) -> Vec<String> {
        let mut cmd = match platform {
            Platform::Cygwin => to_strings(&["cmd", "/C", "apm"]),
            Platform::Windows => to_strings(&["apm.cmd"]),
            _ => to_strings(&["apm"]),
        };
        cmd.extend(to_strings(&["update", "--no-confirm"]));
        cmd
    }
}

#[async_trait]
impl Updater for AtomUpdater {
    fn config_command(&self) -> &'static str {
        "atom"
    }

    fn cli_arg(&self) -> Arg {
        flag_arg("atom", "Specify that Atom's packages should be updated")
    }

    fn update_opts_from_cli(&mut self, matches: &ArgMatches) {
        self.enabled |= matches.get_flag("atom");
    }

    fn update_opts_for_command(&mut self, _ccmd: &ConfigCommand) -> JnsResult<()> {
        self.enabled = true;
        Ok(())
    }

    fn validate_opts(&self, _ctx: &UpdateContext) -> JnsResult<()> {
        Ok(())
    }

    fn pending(&self) -> Vec<String> {
        pending_flag("atom", self.enabled)
    }

    async fn update(&mut self, ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()> {
        if self.enabled {
            let cmd = Self::command(ctx.platform);
            runner
                .run(&[cmd], Path::new("."), Some("updating atom's packages"))
                .await?;
        }
        Ok(())
    }
}

/// `choco upgrade all` through an elevated PowerShell.
#[derive(Debug, Default)]
pub struct ChocoUpdater {
    enabled: bool,
}

impl ChocoUpdater {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Updater for ChocoUpdater {
    fn config_command(&self) -> &'static str {
        "choco"
    }

    fn cli_arg(&self) -> Arg {
        flag_arg("choco", "Specify that all Chocolatey packages should be updated")
    }

    fn update_opts_from_cli(&mut self, matches: &ArgMatches) {
        self.enabled |= matches.get_flag("choco");
    }

    fn update_opts_for_command(&mut self, _ccmd: &ConfigCommand) -> JnsResult<()> {
        self.enabled = true;
        Ok(())
    }

    fn validate_opts(&self, ctx: &UpdateContext) -> JnsResult<()> {
        if self.enabled && !(ctx.dry_run || ctx.platform.is_windows_like()) {
            return Err(JnsError::validation(
                "Can only update Chocolatey packages when in Windows, in Cygwin, or performing a dry run.",
            ));
        }
        Ok(())
    }

    fn pending(&self) -> Vec<String> {
        pending_flag("choco", self.enabled)
    }

    async fn update(&mut self, _ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()> {
        if self.enabled {
            let cmd = to_strings(&[
                "Powershell",
                "-Command",
                r#"& { Start-Process "choco" -ArgumentList @("upgrade", "all") -Verb RunAs }"#,
            ]);
            runner
                .run(&[cmd], Path::new("."), Some("updating chocolatey packages"))
                .await?;
        }
        Ok(())
    }
}

/// Runs Cygwin's setup executable unattended.
#[derive(Debug, Default)]
pub struct CygwinUpdater {
    setup_exe: Option<PathBuf>,
}

impl CygwinUpdater {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Updater for CygwinUpdater {
    fn config_command(&self) -> &'static str {
        "cygwin"
    }

    fn cli_arg(&self) -> Arg {
        Arg::new("cygwin")
            .long("cygwin")
            .action(ArgAction::Set)
            .value_name("SETUP_EXE")
            .help("Specify the location of Cygwin's setup-x86.exe or setup-x86_64.exe")
    }

    fn update_opts_from_cli(&mut self, matches: &ArgMatches) {
        if let Some(exe) = matches.get_one::<String>("cygwin") {
            self.setup_exe = Some(expand_home(exe));
        }
    }

    fn update_opts_for_command(&mut self, ccmd: &ConfigCommand) -> JnsResult<()> {
        self.setup_exe = Some(file_argument(ccmd)?);
        Ok(())
    }

    fn validate_opts(&self, ctx: &UpdateContext) -> JnsResult<()> {
        let Some(exe) = &self.setup_exe else {
            return Ok(());
        };
        if !(ctx.dry_run || ctx.platform.is_windows_like()) {
            return Err(JnsError::validation(
                "Can only update Cygwin packages when in Windows, in Cygwin, or performing a dry run.",
            ));
        }
        validate_is_file(exe)
    }

    fn pending(&self) -> Vec<String> {
        self.setup_exe
            .iter()
            .map(|exe| format!("cygwin:{}", exe.display()))
            .collect()
    }

    async fn update(&mut self, _ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()> {
        if let Some(exe) = &self.setup_exe {
            let cmd = vec![
                exe.display().to_string(),
                "--quiet-mode".to_string(),
                "--no-desktop".to_string(),
            ];
            runner
                .run(&[cmd], Path::new("."), Some("updating cygwin packages"))
                .await?;
        }
        Ok(())
    }
}

/// Invokes `init-jns` to refresh the junk-n-stuff installation.
#[derive(Debug, Default)]
pub struct InitJnsUpdater {
    enabled: bool,
}

impl InitJnsUpdater {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Updater for InitJnsUpdater {
    fn config_command(&self) -> &'static str {
        "init-jns"
    }

    fn cli_arg(&self) -> Arg {
        flag_arg("init-jns", "Invoke `init-jns' from junk-n-stuff")
    }

    fn update_opts_from_cli(&mut self, matches: &ArgMatches) {
        self.enabled |= matches.get_flag("init-jns");
    }

    fn update_opts_for_command(&mut self, _ccmd: &ConfigCommand) -> JnsResult<()> {
        self.enabled = true;
        Ok(())
    }

    fn validate_opts(&self, ctx: &UpdateContext) -> JnsResult<()> {
        if self.enabled && !ctx.dry_run && ctx.platform == Platform::Windows {
            return Err(JnsError::validation(
                "Cannot initialize junk-n-stuff in Windows unless performing a dry run.",
            ));
        }
        Ok(())
    }

    fn pending(&self) -> Vec<String> {
        pending_flag("init-jns", self.enabled)
    }

    async fn update(&mut self, _ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()> {
        if self.enabled {
            runner
                .run(
                    &[to_strings(&["init-jns"])],
                    Path::new("."),
                    Some("initializing junk-n-stuff"),
                )
                .await?;
        }
        Ok(())
    }
}
