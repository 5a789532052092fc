// ── ActiveRegistry – live sessions, and the per-host stop directive ──────────
//
// One entry per host with a live session. Removing an entry *is* the stop
// signal: the owning worker re-checks its registration before every blocking
// wait and treats absence as "stop now". Stop therefore only ever affects a
// registered session; asking to stop an unknown host is a no-op.

use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub username: String,
    pub connected_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(username: &str) -> Self {
        SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            connected_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ActiveRegistry {
    inner: Mutex<HashMap<String, SessionRecord>>,
}

impl ActiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly connected session. At most one live session per
    /// host: a second registration for the same host is a protocol violation.
    pub fn register(&self, host: &str, record: SessionRecord) -> Result<(), String> {
        let mut map = self.lock();
        if map.contains_key(host) {
            return Err(format!("host '{}' already has a registered session", host));
        }
        map.insert(host.to_string(), record);
        Ok(())
    }

    /// Whether the host still holds a live registration. Workers poll this;
    /// `false` after a successful register means an external stop.
    pub fn contains(&self, host: &str) -> bool {
        self.lock().contains_key(host)
    }

    /// Out-of-band stop directive for one host. Returns whether a session was
    /// actually registered (and is therefore now signalled).
    pub fn stop(&self, host: &str) -> bool {
        let removed = self.lock().remove(host).is_some();
        if removed {
            info!("stop requested for {}", host);
        } else {
            warn!("stop requested for {} but no session is registered", host);
        }
        removed
    }

    /// Normal removal on session close. Idempotent.
    pub fn deregister(&self, host: &str) {
        self.lock().remove(host);
    }

    pub fn active_hosts(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionRecord>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = ActiveRegistry::new();
        registry
            .register("192.168.0.108", SessionRecord::new("reip"))
            .unwrap();
        let err = registry
            .register("192.168.0.108", SessionRecord::new("reip"))
            .unwrap_err();
        assert!(err.contains("already"));
    }

    #[test]
    fn stop_removes_the_registration() {
        let registry = ActiveRegistry::new();
        registry
            .register("192.168.0.108", SessionRecord::new("reip"))
            .unwrap();
        assert!(registry.contains("192.168.0.108"));
        assert!(registry.stop("192.168.0.108"));
        assert!(!registry.contains("192.168.0.108"));
    }

    #[test]
    fn stop_without_a_session_is_a_noop() {
        let registry = ActiveRegistry::new();
        assert!(!registry.stop("192.168.0.184"));
    }

    #[test]
    fn deregister_is_idempotent() {
        let registry = ActiveRegistry::new();
        registry
            .register("192.168.0.108", SessionRecord::new("reip"))
            .unwrap();
        registry.deregister("192.168.0.108");
        registry.deregister("192.168.0.108");
        assert!(registry.active_hosts().is_empty());
    }
}
