//! uuu: update... all the things.
//!
//! Global flags are declared here; every updater unit contributes its own
//! flag through the registry, and `~/.jns/uuu` can add more work.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, FromArgMatches, Parser};
use tracing::{debug, warn};

use junk_n_stuff::error::exit_code_for;
use junk_n_stuff::logging;
use junk_n_stuff::uuu::config::{default_config_path, ConfigFileReader};
use junk_n_stuff::uuu::{Registry, Runner, UpdateContext};

#[derive(Debug, Parser)]
#[command(name = "uuu", version, about = "Update... all the things!")]
struct Cli {
    /// Output what actions will be performed without taking them.
    #[arg(long)]
    dry_run: bool,
    /// Print every command before running it.
    #[arg(short, long)]
    verbose: bool,
    /// Configuration file to read instead of ~/.jns/uuu.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Do not read any configuration file.
    #[arg(long)]
    no_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("uuu: {:#}", err);
            ExitCode::from(exit_code_for(&err) as u8)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let mut registry = Registry::standard();
    let matches = registry.augment_command(Cli::command()).get_matches();
    let cli = Cli::from_arg_matches(&matches)?;
    logging::init(cli.verbose);
    registry.apply_matches(&matches);

    if !cli.no_config {
        if let Some(path) = cli.config.clone().or_else(default_config_path) {
            let reader = ConfigFileReader::new(path);
            let read = reader
                .read_config_file(&mut registry)
                .with_context(|| format!("failed to read {}", reader.path().display()))?;
            debug!(path = %reader.path().display(), read, "config file");
        }
    }

    let ctx = UpdateContext::new(cli.dry_run);
    registry.validate_all(&ctx)?;
    if cli.verbose {
        for entry in registry.pending() {
            println!("pending: {}", entry);
        }
    }
    if !ctx.dry_run && !is_root() {
        let requirers = registry.root_requirers(&ctx);
        if !requirers.is_empty() {
            warn!(units = ?requirers, "some updates need root privileges; expect sudo prompts");
        }
    }

    let mut runner = Runner::new(cli.dry_run, cli.verbose);
    registry.update_all(&ctx, &mut runner).await?;
    if runner.failure_count() > 0 {
        debug!(failures = runner.failure_count(), "some updates failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(unix)]
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}
