// ── Fleet configuration – the pre-enumerated host list for a run ─────────────

use crate::fleet::types::NodeSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_remote_data_root() -> String {
    "/media/reip/ssd/data".to_string()
}

fn default_local_data_dir() -> String {
    "data".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

// ── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetConfig {
    pub nodes: Vec<NodeSpec>,
    /// Remote base path; joined with each node's own date to locate its data.
    #[serde(default = "default_remote_data_root")]
    pub remote_data_root: String,
    /// Local base path; runs mirror into `<localDataDir>/<LocalDate>/<host>`.
    #[serde(default = "default_local_data_dir")]
    pub local_data_dir: String,
    /// Default command for exec mode; the CLI flag overrides it.
    #[serde(default)]
    pub command: Option<String>,
    /// Per-host session timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FleetConfig {
    pub fn load(path: &Path) -> Result<FleetConfig, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config '{}': {}", path.display(), e))?;
        serde_json::from_str(&raw)
            .map_err(|e| format!("malformed config '{}': {}", path.display(), e))
    }
}
