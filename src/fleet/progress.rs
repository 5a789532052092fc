// ── TransferJob – byte accounting and percent milestones ─────────────────────
//
// Single-writer per host (the owning worker), so no locking here. Converts a
// stream of chunk deltas into a strictly increasing sequence of whole-percent
// milestones; duplicate and regressive values are suppressed.

/// Byte accounting for one host's transfer. `total_bytes` is fixed once the
/// initial size walk finishes: files added remotely after the scan are not
/// picked up.
#[derive(Debug)]
pub struct TransferJob {
    total_bytes: u64,
    downloaded_bytes: u64,
    last_percent: Option<u8>,
}

impl TransferJob {
    pub fn new(total_bytes: u64) -> Self {
        TransferJob {
            total_bytes,
            downloaded_bytes: 0,
            last_percent: None,
        }
    }

    /// Record one received chunk (incremental byte count, not cumulative).
    /// Returns the new whole-percent milestone when one is crossed.
    ///
    /// Percentage is undefined for a zero-byte job; the caller emits its own
    /// immediate completion instead and never sees a milestone here.
    pub fn record_chunk(&mut self, delta: u64) -> Option<u8> {
        self.downloaded_bytes += delta;
        if self.total_bytes == 0 {
            return None;
        }
        let percent = ((self.downloaded_bytes * 100) / self.total_bytes).min(100) as u8;
        match self.last_percent {
            Some(last) if percent <= last => None,
            _ => {
                self.last_percent = Some(percent);
                Some(percent)
            }
        }
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded_bytes
    }

    pub fn total(&self) -> u64 {
        self.total_bytes
    }
}
