// ── fleetpull CLI ────────────────────────────────────────────────────────────
//
// Thin adapter around the engine: argument parsing, logging init, and the
// mapping from OS signals to the engine's shutdown flag. Everything else
// lives in the library.

use clap::{Parser, Subcommand};
use fleetpull::fleet::health;
use fleetpull::{
    run_fleet, EventSink, FleetConfig, RunContext, RunMode, ShutdownFlag, WorkerParams,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetpull", about = "SSH/SFTP fan-out for fleets of sensor nodes")]
struct Cli {
    /// Fleet configuration file (JSON).
    #[arg(short, long, default_value = "fleet.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mirror each node's data directory for its own calendar day.
    Pull {
        /// Per-host session timeout in seconds (overrides the config).
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Run a command on every node, streaming output.
    Run {
        /// Remote command (overrides the config's default command).
        #[arg(short = 'x', long)]
        command: Option<String>,
        /// Per-host session timeout in seconds (overrides the config).
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// One-shot TCP + auth probe of every node.
    Health,
}

/// Map SIGINT/SIGTERM onto the engine's shutdown flag. Workers observe the
/// flag cooperatively; the coordinator still joins them all.
fn install_signal_adapter(flag: ShutdownFlag) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("cannot install SIGTERM handler: {}", e);
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        flag.trigger();
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match FleetConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let (mode, timeout) = match cli.command {
        Command::Pull { timeout } => (RunMode::Pull, timeout),
        Command::Run { command, timeout } => {
            let command = match command.or_else(|| config.command.clone()) {
                Some(c) => c,
                None => {
                    eprintln!("no command given: pass --command or set it in the config");
                    return ExitCode::FAILURE;
                }
            };
            (RunMode::Exec { command }, timeout)
        }
        Command::Health => {
            let statuses = tokio::task::spawn_blocking(move || {
                health::run_health_check(&config.nodes, health::DEFAULT_PROBE_TIMEOUT)
            })
            .await
            .unwrap_or_default();
            match serde_json::to_string(&statuses) {
                Ok(json) => {
                    println!("{}", json);
                    return ExitCode::SUCCESS;
                }
                Err(e) => {
                    eprintln!("cannot serialize health report: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    let params = WorkerParams {
        session_timeout: Duration::from_secs(timeout.unwrap_or(config.timeout_secs)),
        ..WorkerParams::default()
    };

    let shutdown = ShutdownFlag::new();
    install_signal_adapter(shutdown.clone());
    let ctx = RunContext::with_shutdown(params, EventSink::stdout(), shutdown);

    // Per-host failures are data in the summary; only a coordinator-level
    // precondition failure is fatal to the process.
    match run_fleet(&config, mode, &ctx).await {
        Ok(summary) => {
            let failed = summary.failed_hosts();
            if !failed.is_empty() {
                log::warn!("{} host(s) failed: {}", failed.len(), failed.join(", "));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
