// ── ShutdownFlag – set-once cooperative cancellation ─────────────────────────
//
// Process-scoped but explicitly owned: the coordinator holds one and hands
// clones to every worker. The mapping from OS signals to `trigger()` lives in
// the binary, outside the engine.

use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    inner: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Idempotent; only the first trigger is logged.
    pub fn trigger(&self) {
        if !self.inner.swap(true, Ordering::SeqCst) {
            info!("shutdown requested, waiting for workers to unwind");
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear_and_stays_set() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_triggered());
        flag.trigger();
        flag.trigger();
        assert!(flag.is_triggered());
    }

    #[test]
    fn clones_share_state() {
        let flag = ShutdownFlag::new();
        let seen_by_worker = flag.clone();
        flag.trigger();
        assert!(seen_by_worker.is_triggered());
    }
}
