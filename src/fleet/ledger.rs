// ── RunLedger – shared host → outcome map ────────────────────────────────────
//
// Seeded with every configured host as `pending`, written exactly once per
// host by its worker, and read by the coordinator only after the join
// barrier. The first write wins; a second write is a bug and is logged.

use crate::fleet::types::HostOutcome;
use log::warn;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct RunLedger {
    inner: Mutex<HashMap<String, HostOutcome>>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every configured host unresolved before any worker starts.
    pub fn seed<I: IntoIterator<Item = String>>(&self, hosts: I) {
        let mut map = self.lock();
        for host in hosts {
            map.entry(host).or_insert(HostOutcome::Pending);
        }
    }

    /// Record a host's terminal outcome. Write-once: an already resolved host
    /// keeps its first outcome.
    pub fn record(&self, host: &str, outcome: HostOutcome) {
        let mut map = self.lock();
        match map.get(host) {
            Some(existing) if !existing.is_pending() => {
                warn!(
                    "ledger already holds an outcome for {}, dropping duplicate {:?}",
                    host, outcome
                );
            }
            _ => {
                map.insert(host.to_string(), outcome);
            }
        }
    }

    /// Hosts still unresolved. Empty after a clean join.
    pub fn unresolved(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, o)| o.is_pending())
            .map(|(h, _)| h.clone())
            .collect()
    }

    /// Sorted copy of the whole ledger, for the terminal summary.
    pub fn snapshot(&self) -> BTreeMap<String, HostOutcome> {
        self.lock()
            .iter()
            .map(|(h, o)| (h.clone(), o.clone()))
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HostOutcome>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_hosts_start_pending() {
        let ledger = RunLedger::new();
        ledger.seed(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(ledger.unresolved().len(), 2);
    }

    #[test]
    fn first_write_wins() {
        let ledger = RunLedger::new();
        ledger.seed(vec!["a".to_string()]);
        ledger.record("a", HostOutcome::Timeout);
        ledger.record(
            "a",
            HostOutcome::Error {
                error: "late duplicate".into(),
            },
        );
        assert_eq!(ledger.snapshot()["a"], HostOutcome::Timeout);
    }

    #[test]
    fn snapshot_is_sorted_by_host() {
        let ledger = RunLedger::new();
        ledger.record("b", HostOutcome::Stopped);
        ledger.record("a", HostOutcome::Stopped);
        let hosts: Vec<_> = ledger.snapshot().into_keys().collect();
        assert_eq!(hosts, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn resolving_clears_unresolved() {
        let ledger = RunLedger::new();
        ledger.seed(vec!["a".to_string()]);
        ledger.record(
            "a",
            HostOutcome::Downloaded {
                path: "data/a".into(),
                bytes: 0,
                total: 0,
            },
        );
        assert!(ledger.unresolved().is_empty());
    }
}
