// ── Worker error taxonomy ────────────────────────────────────────────────────
//
// Every variant is fatal to one host only. All of them are caught at the
// worker boundary and converted into a ledger entry; none abort the run.

use crate::fleet::types::HostOutcome;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// TCP, handshake, or auth failure before any remote work started.
    /// The message names the phase that failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A required pre-flight remote query failed or produced diagnostics.
    #[error("remote probe failed: {0}")]
    Probe(String),

    /// I/O failure mid-transfer or mid-exec. Partial local files stay as-is.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Local wall-clock deadline exceeded. A graceful stop, not a crash.
    #[error("session deadline of {0:?} exceeded")]
    Timeout(Duration),

    /// The global shutdown flag was observed.
    #[error("shutdown requested")]
    Shutdown,

    /// This host's entry was removed from the active registry.
    #[error("stopped by operator")]
    Stopped,
}

impl WorkerError {
    /// Collapse into the ledger record for this host. Shutdown and per-host
    /// stop share the `stopped` tag; the cause stays in the logs.
    pub fn into_outcome(self) -> HostOutcome {
        match self {
            WorkerError::Timeout(_) => HostOutcome::Timeout,
            WorkerError::Shutdown | WorkerError::Stopped => HostOutcome::Stopped,
            other => HostOutcome::Error {
                error: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_error_keeps_phase_in_message() {
        let outcome = WorkerError::Connect("tcp: connection refused".into()).into_outcome();
        match outcome {
            HostOutcome::Error { error } => {
                assert!(error.contains("tcp"));
                assert!(error.contains("connect failed"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn cancellation_causes_are_not_errors() {
        assert_eq!(WorkerError::Shutdown.into_outcome(), HostOutcome::Stopped);
        assert_eq!(WorkerError::Stopped.into_outcome(), HostOutcome::Stopped);
        assert_eq!(
            WorkerError::Timeout(Duration::from_secs(2)).into_outcome(),
            HostOutcome::Timeout
        );
    }
}
