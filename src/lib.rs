//! Concurrent SSH/SFTP command fan-out and data collection for small fleets
//! of headless edge sensor nodes.
//!
//! The engine connects to every configured node in parallel, either mirrors
//! that node's date-keyed data directory over SFTP (with whole-percent
//! progress milestones) or runs a time-bounded command on it, and reports
//! everything as a line-oriented event stream ending in exactly one
//! `SUMMARY` line. Cancellation is cooperative: a global shutdown flag, a
//! per-host stop directive, and per-session deadlines all unwind workers
//! cleanly through the same join barrier.

pub mod config;
pub mod fleet;

pub use config::FleetConfig;
pub use fleet::{
    run_fleet, ActiveRegistry, CoordinatorError, EventSink, FleetEvent, HostOutcome, NodeSpec,
    RunContext, RunMode, RunSummary, ShutdownFlag, WorkerParams,
};
