// ── Event stream – the line protocol consumed by the external relay ──────────
//
// Every event is one UTF-8 line, written and flushed atomically so lines from
// different hosts never interleave. The relay forwards them verbatim.

use log::warn;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

// ── Events ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FleetEvent {
    /// Emitted only when a host crosses a new whole-percent milestone.
    Progress {
        host: String,
        downloaded: u64,
        total: u64,
    },
    /// Transfer finished for a host; carries the local destination path.
    Complete { host: String, path: String },
    /// The remote root held no data; nothing was transferred.
    CompleteEmpty { host: String },
    /// The host failed; the reason lives in the ledger, not on this line.
    CompleteError { host: String },
    /// One verbatim line of remote output in command-execution mode.
    Remote { host: String, line: String },
    /// Host-tagged lifecycle notice (connected / timeout / disconnected).
    Notice { host: String, text: String },
    /// The terminal summary: the full ledger as one JSON object.
    Summary { report: String },
}

impl fmt::Display for FleetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetEvent::Progress {
                host,
                downloaded,
                total,
            } => write!(f, "PROGRESS {} {} {}", host, downloaded, total),
            FleetEvent::Complete { host, path } => write!(f, "COMPLETE {} {}", host, path),
            FleetEvent::CompleteEmpty { host } => write!(f, "COMPLETE {} 0", host),
            FleetEvent::CompleteError { host } => write!(f, "COMPLETE {} ERROR", host),
            FleetEvent::Remote { host, line } => write!(f, "[{}] {}", host, line),
            FleetEvent::Notice { host, text } => write!(f, "[{}] {}", host, text),
            FleetEvent::Summary { report } => write!(f, "SUMMARY {}", report),
        }
    }
}

// ── Sink ─────────────────────────────────────────────────────────────────────

/// Shared, line-atomic writer for the multiplexed event stream.
#[derive(Clone)]
pub struct EventSink {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl EventSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        EventSink {
            out: Arc::new(Mutex::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// In-memory sink for tests and embedding; the returned handle reads back
    /// everything emitted so far.
    pub fn capture() -> (Self, CapturedOutput) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let captured = CapturedOutput { buf: buf.clone() };
        (Self::new(Box::new(SharedBuf { buf })), captured)
    }

    /// Write one full line and flush. The lock spans the whole line so output
    /// from concurrent workers never interleaves.
    pub fn emit(&self, event: &FleetEvent) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{}", event).and_then(|_| out.flush()) {
            warn!("event sink write failed: {}", e);
        }
    }
}

// ── Capture support ──────────────────────────────────────────────────────────

struct SharedBuf {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct CapturedOutput {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap_or_else(PoisonError::into_inner))
            .into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}
