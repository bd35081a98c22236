//! Rust projects tracked straight from their git repositories: clone or
//! pull, build in release mode, then register the binary with
//! `update-alternatives`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clap::{Arg, ArgAction, ArgMatches};

use crate::error::{JnsError, JnsResult};
use crate::uuu::config::ConfigCommand;
use crate::uuu::runner::Runner;
use crate::uuu::updater::{
    add_argument, cli_values, validate_is_directory, Platform, UpdateContext, Updater,
};

const DELIMITER: char = ',';

/// One `git_url,project_home,exe_name` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RustGitProject {
    pub git_url: String,
    pub project_home: PathBuf,
    pub exe_name: String,
}

impl RustGitProject {
    pub fn parse(spec: &str) -> JnsResult<Self> {
        let parts: Vec<&str> = spec.split(DELIMITER).map(str::trim).collect();
        match parts.as_slice() {
            [git_url, project_home, exe_name]
                if !git_url.is_empty() && !project_home.is_empty() && !exe_name.is_empty() =>
            {
                Ok(Self {
                    git_url: git_url.to_string(),
                    project_home: PathBuf::from(project_home),
                    exe_name: exe_name.to_string(),
                })
            }
            _ => Err(JnsError::validation(format!(
                "Expected git_url{d}project_home{d}exe_name: {spec}",
                d = DELIMITER
            ))),
        }
    }

    fn home(&self) -> String {
        self.project_home.display().to_string()
    }

    fn fetch_cmd(&self) -> Vec<String> {
        if self.project_home.exists() {
            vec!["git".into(), "-C".into(), self.home(), "pull".into()]
        } else {
            vec!["git".into(), "clone".into(), self.git_url.clone(), self.home()]
        }
    }

    fn build_cmd(&self) -> Vec<String> {
        vec![
            "cargo".into(),
            "build".into(),
            format!("--manifest-path={}/Cargo.toml", self.home()),
            "--release".into(),
        ]
    }

    fn install_cmd(&self, platform: Platform) -> Vec<String> {
        let mut cmd = Vec::new();
        if platform == Platform::Linux {
            cmd.push("sudo".to_string());
        }
        cmd.extend([
            "update-alternatives".to_string(),
            "--install".to_string(),
            format!("/usr/bin/{}", self.exe_name),
            self.exe_name.clone(),
            format!("{}/target/release/{}", self.home(), self.exe_name),
            "100".to_string(),
        ]);
        cmd
    }

    /// The whole clone-or-pull, build, install sequence as one batch.
    pub fn batch(&self, platform: Platform) -> Vec<Vec<String>> {
        vec![self.fetch_cmd(), self.build_cmd(), self.install_cmd(platform)]
    }
}

#[derive(Debug, Default)]
pub struct RustGitUpdater {
    projects: Vec<String>,
}

impl RustGitUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    fn parsed(&self) -> JnsResult<Vec<RustGitProject>> {
        self.projects.iter().map(|p| RustGitProject::parse(p)).collect()
    }
}

#[async_trait]
impl Updater for RustGitUpdater {
    fn config_command(&self) -> &'static str {
        "rustgit"
    }

    fn cli_arg(&self) -> Arg {
        Arg::new("rustgit")
            .long("rustgit")
            .action(ArgAction::Append)
            .value_name("git_url,project_home,exe_name")
            .help("Specify a Rust+Git project to be updated")
    }

    fn update_opts_from_cli(&mut self, matches: &ArgMatches) {
        self.projects.extend(cli_values(matches, "rustgit"));
    }

    fn update_opts_for_command(&mut self, ccmd: &ConfigCommand) -> JnsResult<()> {
        add_argument(ccmd, &mut self.projects)
    }

    fn validate_opts(&self, ctx: &UpdateContext) -> JnsResult<()> {
        if self.projects.is_empty() {
            return Ok(());
        }
        if !matches!(ctx.platform, Platform::Linux | Platform::Cygwin) {
            return Err(JnsError::validation(
                "The rustgit updater can only be used in Linux or Cygwin",
            ));
        }
        for project in self.parsed()? {
            if project.project_home.exists() {
                validate_is_directory(&project.project_home)?;
            }
        }
        Ok(())
    }

    fn is_root_required(&self, _ctx: &UpdateContext) -> bool {
        !self.projects.is_empty()
    }

    fn pending(&self) -> Vec<String> {
        self.projects
            .iter()
            .map(|project| format!("rustgit:{}", project))
            .collect()
    }

    async fn update(&mut self, ctx: &UpdateContext, runner: &mut Runner) -> JnsResult<()> {
        for project in self.parsed()? {
            let title = format!("updating rust+git project: {}", project.exe_name);
            runner
                .run(&project.batch(ctx.platform), Path::new("."), Some(&title))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::uuu::runner::tests::{argv, RecordingExecutor};

    fn ccmd(argument: &str) -> ConfigCommand {
        ConfigCommand {
            command: "rustgit".to_string(),
            argument: argument.to_string(),
            file_name: "uuu".to_string(),
            line_num: 1,
        }
    }

    #[test]
    fn parses_and_trims_entries() {
        let project = RustGitProject::parse(" https://example.com/x.git , /opt/x ,x ").unwrap();
        assert_eq!(project.git_url, "https://example.com/x.git");
        assert_eq!(project.project_home, PathBuf::from("/opt/x"));
        assert_eq!(project.exe_name, "x");

        for bad in ["https://example.com/x.git", "a,b", "a,,c", "a,b,c,d"] {
            let err = RustGitProject::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{bad}");
        }
    }

    #[test]
    fn clones_missing_projects_and_pulls_existing_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let existing = tmp.path().display().to_string();
        let project = RustGitProject::parse(&format!("url,{},tool", existing)).unwrap();
        let batch = project.batch(Platform::Linux);
        assert_eq!(batch[0], argv(&["git", "-C", &existing, "pull"]));
        assert_eq!(
            batch[1],
            argv(&[
                "cargo",
                "build",
                &format!("--manifest-path={}/Cargo.toml", existing),
                "--release"
            ])
        );
        assert_eq!(batch[2][0], "sudo");

        let missing = tmp.path().join("missing").display().to_string();
        let project = RustGitProject::parse(&format!("url,{},tool", missing)).unwrap();
        let batch = project.batch(Platform::Cygwin);
        assert_eq!(batch[0], argv(&["git", "clone", "url", &missing]));
        assert_eq!(
            batch[2],
            argv(&[
                "update-alternatives",
                "--install",
                "/usr/bin/tool",
                "tool",
                &format!("{}/target/release/tool", missing),
                "100"
            ])
        );
    }

    #[test]
    fn validation_checks_platform_and_home() {
        let mut updater = RustGitUpdater::new();
        let darwin = UpdateContext::on(Platform::Darwin, false);
        assert!(updater.validate_opts(&darwin).is_ok());
        assert!(!updater.is_root_required(&darwin));

        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("home-is-a-file");
        std::fs::write(&file, "").unwrap();
        updater
            .update_opts_for_command(&ccmd(&format!("url,{},tool", file.display())))
            .unwrap();
        assert!(updater.is_root_required(&darwin));
        assert!(updater.validate_opts(&darwin).is_err());
        let err = updater
            .validate_opts(&UpdateContext::on(Platform::Linux, false))
            .unwrap_err();
        assert!(err.to_string().starts_with("Directory is not a directory"));
    }

    #[tokio::test]
    async fn failed_build_skips_install() {
        let tmp = tempfile::tempdir().unwrap();
        let mut updater = RustGitUpdater::new();
        updater
            .update_opts_for_command(&ccmd(&format!("url,{},tool", tmp.path().display())))
            .unwrap();
        let executor = RecordingExecutor::with_codes(&[0, 101]);
        let mut runner = Runner::with_executor(false, false, Box::new(executor.clone()));
        updater
            .update(&UpdateContext::on(Platform::Linux, false), &mut runner)
            .await
            .unwrap();
        let commands = executor.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1][0], "cargo");
        assert_eq!(runner.failure_count(), 1);
    }
}
