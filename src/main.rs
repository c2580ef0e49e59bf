use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

use punt_device::AdbBridge;
use punt_logs::ProcessTracker;
use punt_tui::TerminalPresenter;
use punt_types::Session;

mod config;
mod pipeline;

use config::{Config, Overrides};
use pipeline::{Outcome, Pipeline};

/// Punt - triage a live logcat stream down to the processes you care about
#[derive(Parser, Debug)]
#[command(name = "punt")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML). Defaults apply if it does not exist.
    #[arg(short, long, env = "PUNT_CONFIG")]
    config: Option<String>,

    /// Comma-separated package names to track, replacing the configured list
    #[arg(short, long)]
    packages: Option<String>,

    /// Print a dot per kept record instead of the record itself
    #[arg(short, long)]
    quiet: bool,

    /// Do not write kept records to disk
    #[arg(long)]
    no_save: bool,

    /// Debug-level diagnostics on stderr
    #[arg(long)]
    trace: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Diagnostics go to stderr; stdout carries the record stream
    let (filter, filter_handle) = reload::Layer::new(env_filter(args.trace));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let overrides = Overrides {
        packages: args.packages.clone(),
        no_save: args.no_save,
        trace: args.trace,
        quiet: args.quiet,
    };
    let path = args.config.as_deref().map(config::expand_home);
    let config = match Config::load(path.as_deref(), &overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", anyhow::Error::from(e));
            return ExitCode::FAILURE;
        }
    };
    if config.trace && !args.trace {
        if let Err(e) = filter_handle.reload(env_filter(true)) {
            warn!(error = %e, "failed to raise log level");
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(config));

    // A pending stdin read must not hold up exit
    runtime.shutdown_background();

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn env_filter(trace: bool) -> EnvFilter {
    let level = if trace { Level::DEBUG } else { Level::WARN };
    EnvFilter::from_default_env().add_directive(level.into())
}

async fn run(config: Config) -> Result<Outcome> {
    let session = Session::new();
    info!(session = %session.id, created = %session.created, "new session");

    let bridge = AdbBridge::new(&config.adb)
        .with_serial(config.serial.clone())
        .with_timeout(config.command_timeout);
    let tracker = ProcessTracker::start(bridge, config.packages.clone()).await;
    if !tracker.is_passthrough() && tracker.tracked().next().is_none() {
        warn!(packages = ?config.packages, "none of the packages is running yet");
    }

    let presenter = TerminalPresenter::stdout(config.quiet);
    let mut pipeline = Pipeline::new(&config, session, tracker, presenter);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let input = BufReader::new(tokio::io::stdin());
    let outcome = pipeline
        .run(input, cancel)
        .await
        .context("failed to persist log records")?;
    if outcome == Outcome::ReadFailed {
        anyhow::bail!("failed to read log input");
    }
    Ok(outcome)
}
