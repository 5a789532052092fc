// ── Types ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_ssh_port() -> u16 {
    22
}

// ── Node configuration ───────────────────────────────────────────────────────

/// One configured sensor node. Immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl NodeSpec {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Worker tuning ────────────────────────────────────────────────────────────

/// Timeouts and loop tuning for every host worker. The poll interval and the
/// wall-clock session deadline are deliberate parameters, not constants: they
/// trade cancellation responsiveness against polling overhead.
#[derive(Debug, Clone, Copy)]
pub struct WorkerParams {
    /// TCP connect / SSH handshake / auth timeout (transport level).
    pub connect_timeout: Duration,
    /// Bound on the pre-flight remote probe command.
    pub probe_timeout: Duration,
    /// Wall-clock deadline for the whole per-host session.
    pub session_timeout: Duration,
    /// Sleep between iterations of the read/cancellation poll loop.
    pub poll_interval: Duration,
    /// Transfer read buffer size in bytes.
    pub chunk_size: usize,
}

impl Default for WorkerParams {
    fn default() -> Self {
        WorkerParams {
            connect_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            session_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(100),
            chunk_size: 32 * 1024,
        }
    }
}

// ── Per-host outcome ─────────────────────────────────────────────────────────

/// Terminal record for one host, written exactly once into the run ledger.
/// Timeouts and cooperative stops get their own tags: they are normal
/// terminal causes, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum HostOutcome {
    Downloaded {
        path: String,
        bytes: u64,
        total: u64,
    },
    Executed {
        exit_code: Option<i32>,
    },
    Error {
        error: String,
    },
    Timeout,
    Stopped,
    Pending,
}

impl HostOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, HostOutcome::Pending)
    }
}

// ── Run summary ──────────────────────────────────────────────────────────────

/// Final state of a joined run: every configured host mapped to a definite
/// outcome. Sorted by host so the serialized summary is deterministic.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub outcomes: BTreeMap<String, HostOutcome>,
}

impl RunSummary {
    pub fn failed_hosts(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, HostOutcome::Error { .. }))
            .map(|(h, _)| h.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_spec_defaults_port_22() {
        let spec: NodeSpec =
            serde_json::from_str(r#"{"host":"192.168.0.108","username":"reip"}"#).unwrap();
        assert_eq!(spec.port, 22);
        assert_eq!(spec.addr(), "192.168.0.108:22");
        assert!(spec.password.is_none());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_string(&HostOutcome::Downloaded {
            path: "data/Jun032025/192.168.0.108".into(),
            bytes: 250,
            total: 250,
        })
        .unwrap();
        assert!(json.contains("\"status\":\"downloaded\""));
        assert!(json.contains("\"bytes\":250"));
        assert!(json.contains("\"total\":250"));
    }

    #[test]
    fn error_outcome_carries_message() {
        let json = serde_json::to_string(&HostOutcome::Error {
            error: "tcp: connect refused".into(),
        })
        .unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("tcp"));
    }

    #[test]
    fn timeout_and_stopped_have_own_tags() {
        assert_eq!(
            serde_json::to_string(&HostOutcome::Timeout).unwrap(),
            r#"{"status":"timeout"}"#
        );
        assert_eq!(
            serde_json::to_string(&HostOutcome::Stopped).unwrap(),
            r#"{"status":"stopped"}"#
        );
    }
}
