//! kalp: keeps `gulp watch` and `karma start` alive during front-end work.
//!
//! Checks that `npm install` is current for every root, then supervises one
//! watchdog per task until interrupted.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use junk_n_stuff::error::{exit_code_for, JnsError};
use junk_n_stuff::kalp::config::{
    default_config_path, install_argv, load_config, tasks_for_root, Config, DefaultTasks,
};
use junk_n_stuff::kalp::npm::{check_dependencies, ensure_dependencies};
use junk_n_stuff::kalp::{StopHandle, TaskSpec, Watchdog, WatchdogEvent, WatchdogSet};
use junk_n_stuff::logging;

#[derive(Debug, Parser)]
#[command(
    name = "kalp",
    version,
    about = "A utility to help manage `gulp watch' and `karma' in development environments"
)]
struct Cli {
    /// Just output what actions will be performed without performing them.
    #[arg(long)]
    dry_run: bool,
    /// Do not start the `gulp watch' subprocess.
    #[arg(short = 'G', long)]
    no_gulp: bool,
    /// Do not start the `karma start' subprocess.
    #[arg(short = 'K', long)]
    no_karma: bool,
    /// Root directory (repeatable, default: current directory).
    #[arg(short, long = "root", value_name = "ROOT")]
    roots: Vec<PathBuf>,
    /// Run every task once instead of restarting it when it exits.
    #[arg(long)]
    no_keep_alive: bool,
    /// Path to kalp.toml configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ignore any kalp.toml in the current directory.
    #[arg(long)]
    no_config: bool,
    /// Do not check whether `npm install' is needed.
    #[arg(long)]
    skip_install: bool,
    /// Time a task gets to exit after SIGTERM before it is killed (ms).
    #[arg(long, value_name = "MS", default_value_t = 5000)]
    grace_ms: u64,
    /// Enable debug diagnostics on stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("kalp: {:#}", err);
            ExitCode::from(exit_code_for(&err) as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let roots = resolve_roots(&cli.roots)?;
    let config = load_settings(&cli)?;

    if !(cli.skip_install || config.skip_install.unwrap_or(false)) {
        install_dependencies(&roots, &config, cli.dry_run).await?;
    }

    let defaults = DefaultTasks {
        gulp: !cli.no_gulp,
        karma: !cli.no_karma,
    };
    let mut specs = Vec::new();
    for root in &roots {
        println!("Starting Processes: {}", root.display());
        let tasks = tasks_for_root(root, &config, defaults, !cli.no_keep_alive, cli.dry_run)?;
        if tasks.is_empty() {
            println!("None");
        }
        specs.extend(tasks);
    }
    if specs.is_empty() {
        return Ok(());
    }
    supervise(specs, Duration::from_millis(cli.grace_ms)).await
}

fn resolve_roots(roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
    if roots.is_empty() {
        let cwd = std::env::current_dir().context("failed to read the current directory")?;
        return Ok(vec![cwd]);
    }
    roots.iter().map(|root| resolve_root(root)).collect()
}

fn resolve_root(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        return Err(JnsError::Validation(format!(
            "Root directory does not exist: {}",
            root.display()
        ))
        .into());
    }
    if !root.is_dir() {
        return Err(JnsError::Validation(format!(
            "Root directory is not a directory: {}",
            root.display()
        ))
        .into());
    }
    root.canonicalize()
        .with_context(|| format!("failed to resolve {}", root.display()))
}

fn load_settings(cli: &Cli) -> Result<Config> {
    if cli.no_config {
        return Ok(Config::default());
    }
    match cli.config.clone().or_else(default_config_path) {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path)
        }
        None => Ok(Config::default()),
    }
}

/// Runs the install gate once per distinct manifest directory.
async fn install_dependencies(roots: &[PathBuf], config: &Config, dry_run: bool) -> Result<()> {
    let install_cmd = install_argv(config)?;
    let mut checked = BTreeSet::new();
    for root in roots {
        let report = check_dependencies(root)?;
        if !checked.insert(report.manifest_dir.clone()) {
            continue;
        }
        if !report.needs_install() {
            continue;
        }
        println!("npm install required: {}", root.display());
        for name in &report.uninstalled {
            println!("Dependency not installed: {}", name);
        }
        for name in &report.out_of_date {
            println!("Dependency not up to date: {}", name);
        }
        if ensure_dependencies(&report, &install_cmd, dry_run).await? {
            debug!(dir = %report.manifest_dir.display(), "install command finished");
        }
    }
    Ok(())
}

async fn supervise(specs: Vec<TaskSpec>, grace: Duration) -> Result<()> {
    let (event_tx, event_rx) = mpsc::channel(256);
    let commands: Vec<String> = specs.iter().map(TaskSpec::display_command).collect();
    let mut watchdogs = WatchdogSet::new();
    for (id, spec) in specs.into_iter().enumerate() {
        watchdogs.push(Watchdog::new(id, spec, event_tx.clone()).grace_period(grace));
    }
    // The printer ends once every watchdog (and its sender) is dropped.
    drop(event_tx);
    let printer = spawn_event_printer(event_rx, commands);

    watchdogs.start_all()?;
    spawn_signal_listener(watchdogs.stop_handle());
    let result = watchdogs.join_all().await;
    drop(watchdogs);
    let _ = printer.await;
    result.map_err(Into::into)
}

fn spawn_event_printer(
    mut rx: mpsc::Receiver<WatchdogEvent>,
    commands: Vec<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let command = commands.get(event.id()).map(String::as_str).unwrap_or("");
            match event {
                WatchdogEvent::Starting { command, .. } => {
                    println!("starting subprocess: {}", command)
                }
                WatchdogEvent::DryRun { command, .. } => println!("{}", command),
                WatchdogEvent::Restarting { command, .. } => {
                    println!("restarting subprocess: {}", command)
                }
                WatchdogEvent::Signaled { pid, .. } => {
                    println!("Killing process: {} (pid {})", command, pid)
                }
                WatchdogEvent::Started { pid, .. } => debug!(pid, command, "spawned"),
                WatchdogEvent::Exited { code, .. } => debug!(?code, command, "exited"),
                WatchdogEvent::Stopped { .. } => debug!(command, "supervision ended"),
            }
        }
    })
}

/// The first Ctrl-C or SIGTERM terminates every task; a second one kills
/// whatever is still running.
fn spawn_signal_listener(stop: StopHandle) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            let mut requests = 0;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                requests += 1;
                if escalate(&stop, requests) {
                    return;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let mut requests = 0;
            while tokio::signal::ctrl_c().await.is_ok() {
                requests += 1;
                if escalate(&stop, requests) {
                    return;
                }
            }
        }
    });
}

/// Returns true once there is nothing left to escalate to.
fn escalate(stop: &StopHandle, requests: usize) -> bool {
    if requests == 1 {
        debug!("shutdown requested");
        stop.terminate_all();
        false
    } else {
        println!("Killing all processes");
        stop.kill_all();
        true
    }
}
