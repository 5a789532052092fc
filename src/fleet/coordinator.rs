// ── Coordinator – fan-out, join barrier, terminal summary ────────────────────
//
// One blocking worker task per configured host, no ordering between hosts.
// Even after a shutdown trigger the coordinator waits for every worker to
// unwind; the summary is emitted exactly once, after the join, and every host
// carries a definite outcome. Per-host failures are data, not a run failure.

use crate::fleet::events::FleetEvent;
use crate::fleet::types::{HostOutcome, RunSummary};
use crate::fleet::{worker, RunContext};
use crate::config::FleetConfig;
use chrono::Local;
use futures::future::join_all;
use log::{info, warn};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone)]
pub enum RunMode {
    /// Mirror each node's data directory for its own calendar day.
    Pull,
    /// Run one command on every node, streaming output.
    Exec { command: String },
}

/// The only failures that abort a whole run; everything downstream of worker
/// start becomes a ledger entry instead.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("no nodes configured")]
    NoNodes,
    #[error("cannot create local run directory '{path}': {source}")]
    LocalDir {
        path: String,
        source: std::io::Error,
    },
}

pub async fn run_fleet(
    config: &FleetConfig,
    mode: RunMode,
    ctx: &RunContext,
) -> Result<RunSummary, CoordinatorError> {
    if config.nodes.is_empty() {
        return Err(CoordinatorError::NoNodes);
    }

    ctx.ledger.seed(config.nodes.iter().map(|n| n.host.clone()));

    // Local destination is keyed by the coordinator's date; each node's
    // remote source is keyed by that node's own date.
    let run_dir = PathBuf::from(&config.local_data_dir)
        .join(Local::now().format("%b%d%Y").to_string());
    if matches!(mode, RunMode::Pull) {
        std::fs::create_dir_all(&run_dir).map_err(|e| CoordinatorError::LocalDir {
            path: run_dir.display().to_string(),
            source: e,
        })?;
    }

    info!(
        "starting {} worker(s), session timeout {:?}",
        config.nodes.len(),
        ctx.params.session_timeout
    );

    let mut handles = Vec::with_capacity(config.nodes.len());
    for spec in config.nodes.clone() {
        let ctx = ctx.clone();
        let mode = mode.clone();
        let remote_root = config.remote_data_root.clone();
        let run_dir = run_dir.clone();
        handles.push(tokio::task::spawn_blocking(move || match mode {
            RunMode::Pull => worker::pull_node(&ctx, &spec, &remote_root, &run_dir),
            RunMode::Exec { command } => worker::exec_node(&ctx, &spec, &command),
        }));
    }

    // Join barrier: nothing is read from the ledger before every worker is
    // done, shutdown or not.
    for result in join_all(handles).await {
        if let Err(e) = result {
            warn!("worker task aborted: {}", e);
        }
    }

    // A worker that panicked never wrote its outcome; the summary must still
    // be total.
    for host in ctx.ledger.unresolved() {
        ctx.ledger.record(
            &host,
            HostOutcome::Error {
                error: "worker aborted unexpectedly".into(),
            },
        );
    }

    let outcomes = ctx.ledger.snapshot();
    let report = serde_json::to_string(&outcomes)
        .unwrap_or_else(|e| format!("{{\"serializationError\":\"{}\"}}", e));
    ctx.sink.emit(&FleetEvent::Summary { report });

    Ok(RunSummary { outcomes })
}
