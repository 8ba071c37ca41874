use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use devstack_orchestrator::{
    EnvSnapshot, NonInteractivePrompt, Orchestrator, OrchestratorConfig, ServiceReport,
    WaitOutcome,
};

/// Bring up the local development environment; Ctrl+C tears it down.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML). Defaults to ./devstack.yaml when present.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Environment file loaded before anything else. Defaults to ./.env.local and ./.env.
    #[arg(short, long, value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Deployment mode (overrides ENVIRONMENT). Mail capture runs only in "local".
    #[arg(short, long)]
    mode: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Fail on port conflicts instead of prompting for another port
    #[arg(long)]
    non_interactive: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Before logging, so RUST_LOG may come from the file.
    let env_file = load_env_files(args.env_file.as_deref());

    initialize_logging(args.debug);

    match run(args, env_file).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, env_file: Result<Vec<PathBuf>>) -> Result<ExitCode> {
    for path in env_file? {
        info!("Loaded environment from {}", path.display());
    }

    let env = EnvSnapshot::capture();
    let config = OrchestratorConfig::load(args.config.as_deref(), &env, args.mode)?;

    let mut orchestrator = Orchestrator::new(config);
    if args.non_interactive {
        orchestrator = orchestrator.with_prompt(Box::new(NonInteractivePrompt));
    }

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });

    let mut code = match orchestrator.run_startup().await {
        Ok(()) => {
            log_services(&orchestrator.services());
            match orchestrator.wait_for_children().await {
                WaitOutcome::Interrupted => ExitCode::SUCCESS,
                WaitOutcome::AllExited { failed } if failed.is_empty() => {
                    info!("All services exited");
                    ExitCode::SUCCESS
                }
                WaitOutcome::AllExited { failed } => {
                    error!(?failed, "Services exited unsuccessfully");
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) if e.is_interrupted() => {
            info!("Interrupted during startup");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Startup failed: {}", e);
            ExitCode::FAILURE
        }
    };

    let report = orchestrator.shutdown().await;
    if !report.is_clean() {
        code = ExitCode::FAILURE;
    }
    Ok(code)
}

/// Load the requested env file, or the default ones when present. Never overrides set variables.
fn load_env_files(explicit: Option<&Path>) -> Result<Vec<PathBuf>> {
    if let Some(path) = explicit {
        dotenv::from_path(path)
            .with_context(|| format!("Failed to load environment file {}", path.display()))?;
        return Ok(vec![path.to_path_buf()]);
    }

    // Earlier files win; .env.local holds per-machine overrides.
    let mut loaded = Vec::new();
    for name in [".env.local", ".env"] {
        if let Ok(path) = dotenv::from_filename(name) {
            loaded.push(path);
        }
    }
    Ok(loaded)
}

fn log_services(services: &[ServiceReport]) {
    for service in services {
        match service.failure {
            Some(ref reason) => warn!(
                service = %service.name,
                state = %service.state,
                "{}",
                reason
            ),
            None => info!(
                service = %service.name,
                state = %service.state,
                port = ?service.port,
                pid = ?service.pid,
                "Service status"
            ),
        }
    }
}

fn initialize_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to create SIGTERM handler");
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("Failed to create SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(windows)]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
