//! AirTouch Controller - closed-loop zone control daemon.
//!
//! Run with: `cargo run -p airtouch-service -- --simulate run`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use airtouch_core::AcDriver;
use airtouch_service::{AppState, Config, Orchestrator, default_config_path, simulated_driver};
use airtouch_types::SystemClock;

/// AirTouch Controller - closed-loop zone control for AirTouch air conditioners.
#[derive(Parser, Debug)]
#[command(name = "airtouch-controller")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Drive an in-memory simulated plant instead of a real controller.
    #[arg(long, global = true)]
    simulate: bool,

    /// Run a single cycle, print its records as JSON and exit.
    #[arg(long, global = true)]
    once: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control loop in the foreground (default behavior).
    Run,

    /// Load and validate the configuration, then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("airtouch_service=info".parse()?),
        )
        .init();

    match args.command {
        Some(Command::CheckConfig) => check_config(&args),
        Some(Command::Run) | None => run(args).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    Ok(config)
}

fn check_config(args: &Args) -> anyhow::Result<()> {
    let path = args.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(args)?;
    match config.validate() {
        Ok(()) => {
            println!(
                "{}: OK ({} zone(s), {}-minute cycle)",
                path.display(),
                config.zones.len(),
                config.timing.resample_interval_minutes
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", path.display(), e);
            Err(e.into())
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    if !args.simulate {
        bail!(
            "no AirTouch transport is built into this binary; run with --simulate to drive a simulated plant"
        );
    }
    let driver: Arc<dyn AcDriver> = Arc::new(simulated_driver(&config)?);

    let state = AppState::new(config, Arc::new(SystemClock))?;
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&state), driver)?);

    if args.once {
        let records = orchestrator.run_cycle().await;
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialize cycle records")?
        );
        return Ok(());
    }

    let mut handle = Arc::clone(&orchestrator).start();

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
            state.control.signal_stop();
            handle.await?;
        }
        finished = &mut handle => finished?,
    }

    if let Some(started) = state.control.started_at() {
        info!(
            "Ran {} cycle(s) since {}",
            state.control.cycles(),
            started
        );
    }
    for stats in state.control.stats().await {
        info!(
            "{}: {} commanded, {} faulted, {} skipped",
            stats.alias.as_deref().unwrap_or(stats.zone.as_str()),
            stats.commanded_count,
            stats.fault_count,
            stats.skipped_count
        );
    }

    Ok(())
}
