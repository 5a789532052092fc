// ── fleetpull / fleet module ─────────────────────────────────────────────────
//
// Concurrent multi-host orchestration over SSH/SFTP:
//   • Per-host session lifecycle (connect / probe / transfer / exec / close)
//   • Recursive SFTP mirror with byte-accurate percent milestones
//   • Shared run ledger, written by workers, read after the join barrier
//   • Cooperative cancellation: global shutdown flag, per-host stop via the
//     active registry, and per-session wall-clock deadlines
//   • Line-atomic event stream for an external relay

pub mod coordinator;
pub mod error;
pub mod events;
pub mod health;
pub mod ledger;
pub mod progress;
pub mod registry;
pub mod session;
pub mod shutdown;
pub mod types;
pub mod walker;
pub mod worker;

pub use coordinator::{run_fleet, CoordinatorError, RunMode};
pub use error::WorkerError;
pub use events::{EventSink, FleetEvent};
pub use ledger::RunLedger;
pub use registry::ActiveRegistry;
pub use shutdown::ShutdownFlag;
pub use types::{HostOutcome, NodeSpec, RunSummary, WorkerParams};

use std::sync::Arc;

/// Everything a worker shares with the coordinator and its siblings. The
/// registry and ledger are the only cross-worker state; both live behind
/// their own locks. Cloning is cheap and hands out the same run.
#[derive(Clone)]
pub struct RunContext {
    pub params: WorkerParams,
    pub sink: EventSink,
    pub shutdown: ShutdownFlag,
    pub registry: Arc<ActiveRegistry>,
    pub ledger: Arc<RunLedger>,
}

impl RunContext {
    pub fn new(params: WorkerParams, sink: EventSink) -> Self {
        Self::with_shutdown(params, sink, ShutdownFlag::new())
    }

    /// Use an externally owned shutdown flag, e.g. one wired to OS signals.
    pub fn with_shutdown(params: WorkerParams, sink: EventSink, shutdown: ShutdownFlag) -> Self {
        RunContext {
            params,
            sink,
            shutdown,
            registry: Arc::new(ActiveRegistry::new()),
            ledger: Arc::new(RunLedger::new()),
        }
    }
}
