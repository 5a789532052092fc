// ── Host worker – the per-host unit of concurrency ───────────────────────────
//
// One worker per host, running on a blocking thread. Whatever happens, a
// worker deregisters its session, closes it, and writes exactly one outcome
// into the ledger before it returns.
//
// Phase order in pull mode: connect → probe the node's own date → size walk →
// mirror. Cancellation (global flag, registry removal, wall-clock deadline)
// is checked before connect, between phases, on every poll-loop iteration and
// on every received chunk.

use crate::fleet::error::WorkerError;
use crate::fleet::events::FleetEvent;
use crate::fleet::progress::TransferJob;
use crate::fleet::registry::SessionRecord;
use crate::fleet::session::NodeSession;
use crate::fleet::types::{HostOutcome, NodeSpec};
use crate::fleet::walker::{mirror, tree_size, SftpTree};
use crate::fleet::RunContext;
use log::{info, warn};
use std::borrow::Cow;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

// ── Cancellation guard ───────────────────────────────────────────────────────

/// The three stop conditions a worker must observe wherever it could block.
/// Registry absence only counts once the worker has registered; before that,
/// an empty registry just means "not connected yet".
struct CancelGuard<'a> {
    ctx: &'a RunContext,
    host: &'a str,
    deadline: Instant,
    registered: bool,
}

impl<'a> CancelGuard<'a> {
    fn new(ctx: &'a RunContext, host: &'a str) -> Self {
        CancelGuard {
            ctx,
            host,
            deadline: Instant::now() + ctx.params.session_timeout,
            registered: false,
        }
    }

    fn check(&self) -> Result<(), WorkerError> {
        if self.ctx.shutdown.is_triggered() {
            return Err(WorkerError::Shutdown);
        }
        if self.registered && !self.ctx.registry.contains(self.host) {
            return Err(WorkerError::Stopped);
        }
        if Instant::now() >= self.deadline {
            return Err(WorkerError::Timeout(self.ctx.params.session_timeout));
        }
        Ok(())
    }
}

// ── Pull mode ────────────────────────────────────────────────────────────────

struct PullReport {
    local_path: String,
    bytes: u64,
    total: u64,
}

/// Mirror one node's data directory for its own calendar day. Terminal: one
/// COMPLETE line, one ledger record.
pub fn pull_node(ctx: &RunContext, spec: &NodeSpec, remote_data_root: &str, run_dir: &Path) {
    let host = spec.host.clone();
    let outcome = match run_pull(ctx, spec, remote_data_root, run_dir) {
        Ok(report) => {
            if report.total == 0 {
                ctx.sink.emit(&FleetEvent::CompleteEmpty { host: host.clone() });
            } else {
                ctx.sink.emit(&FleetEvent::Complete {
                    host: host.clone(),
                    path: report.local_path.clone(),
                });
            }
            HostOutcome::Downloaded {
                path: report.local_path,
                bytes: report.bytes,
                total: report.total,
            }
        }
        Err(e) => {
            warn!("[{}] pull failed: {}", host, e);
            ctx.sink.emit(&FleetEvent::CompleteError { host: host.clone() });
            e.into_outcome()
        }
    };
    ctx.registry.deregister(&host);
    ctx.ledger.record(&host, outcome);
}

fn run_pull(
    ctx: &RunContext,
    spec: &NodeSpec,
    remote_data_root: &str,
    run_dir: &Path,
) -> Result<PullReport, WorkerError> {
    let mut guard = CancelGuard::new(ctx, &spec.host);
    guard.check()?;

    let mut session = NodeSession::connect(spec, &ctx.params)?;
    ctx.registry
        .register(&spec.host, SessionRecord::new(&spec.username))
        .map_err(WorkerError::Connect)?;
    guard.registered = true;
    guard.check()?;

    // Ask the node for its own notion of "today"; its data directory is keyed
    // by the node's clock, not the coordinator's.
    let remote_date = probe_remote_date(&session, ctx)?;
    let remote_root = PathBuf::from(remote_data_root).join(&remote_date);
    let local_base = run_dir.join(&spec.host);
    guard.check()?;

    let sftp = session.sftp().map_err(WorkerError::Transfer)?;
    let tree = SftpTree::new(&sftp);
    let total = tree_size(&tree, &remote_root)?;
    guard.check()?;

    // Snapshot semantics: total is fixed from here on.
    std::fs::create_dir_all(&local_base).map_err(|e| {
        WorkerError::Transfer(format!("mkdir '{}' failed: {}", local_base.display(), e))
    })?;

    if total == 0 {
        info!("[{}] nothing to transfer under {}", spec.host, remote_root.display());
        session.close();
        return Ok(PullReport {
            local_path: local_base.display().to_string(),
            bytes: 0,
            total: 0,
        });
    }

    let mut job = TransferJob::new(total);
    mirror(
        &tree,
        &remote_root,
        &local_base,
        ctx.params.chunk_size,
        &mut |delta| {
            guard.check()?;
            if job.record_chunk(delta).is_some() {
                ctx.sink.emit(&FleetEvent::Progress {
                    host: spec.host.clone(),
                    downloaded: job.downloaded(),
                    total: job.total(),
                });
            }
            Ok(())
        },
    )?;

    session.close();
    Ok(PullReport {
        local_path: local_base.display().to_string(),
        bytes: job.downloaded(),
        total,
    })
}

fn probe_remote_date(session: &NodeSession, ctx: &RunContext) -> Result<String, WorkerError> {
    let output = session
        .exec_capture("date +%b%d%Y", ctx.params.probe_timeout)
        .map_err(WorkerError::Probe)?;
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return Err(WorkerError::Probe(format!(
            "remote date command error: {}",
            stderr
        )));
    }
    let date = output.stdout.trim().to_string();
    if date.is_empty() {
        return Err(WorkerError::Probe("remote date command gave no output".into()));
    }
    Ok(date)
}

// ── Exec mode ────────────────────────────────────────────────────────────────

/// Run one command on one node, streaming its merged output line by line.
pub fn exec_node(ctx: &RunContext, spec: &NodeSpec, command: &str) {
    let host = spec.host.clone();
    let outcome = match run_exec(ctx, spec, command) {
        Ok(exit_code) => HostOutcome::Executed { exit_code },
        Err(e) => {
            warn!("[{}] exec failed: {}", host, e);
            ctx.sink.emit(&FleetEvent::Notice {
                host: host.clone(),
                text: format!("Session ended: {}", e),
            });
            e.into_outcome()
        }
    };
    ctx.registry.deregister(&host);
    ctx.ledger.record(&host, outcome);
}

fn run_exec(ctx: &RunContext, spec: &NodeSpec, command: &str) -> Result<Option<i32>, WorkerError> {
    let mut guard = CancelGuard::new(ctx, &spec.host);
    guard.check()?;

    let mut session = NodeSession::connect(spec, &ctx.params)?;
    ctx.registry
        .register(&spec.host, SessionRecord::new(&spec.username))
        .map_err(WorkerError::Connect)?;
    guard.registered = true;

    let timeout_secs = ctx.params.session_timeout.as_secs();
    ctx.sink.emit(&FleetEvent::Notice {
        host: spec.host.clone(),
        text: format!("Connected (timeout={}s)", timeout_secs),
    });

    // The remote side self-terminates after the same bound, so a dropped
    // connection cannot leave an orphaned process behind. The local deadline
    // below is the backstop that releases our own resources.
    let wrapped = format!(
        "timeout {} sh -c {}",
        timeout_secs,
        shell_escape::escape(Cow::Borrowed(command))
    );

    let mut channel = session
        .open_command(&wrapped)
        .map_err(WorkerError::Transfer)?;
    session.set_nonblocking(true);

    let mut buf = [0u8; 16 * 1024];
    let mut pending_line = String::new();
    let mut cancelled: Option<WorkerError> = None;

    loop {
        match guard.check() {
            Ok(()) => {}
            Err(e) => {
                cancelled = Some(e);
                break;
            }
        }

        match channel.read(&mut buf) {
            Ok(0) => {
                if channel.eof() {
                    break;
                }
            }
            Ok(n) => {
                pending_line.push_str(&String::from_utf8_lossy(&buf[..n]));
                emit_complete_lines(ctx, &spec.host, &mut pending_line);
                continue; // drain before sleeping again
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                session.set_nonblocking(false);
                let _ = channel.close();
                return Err(WorkerError::Transfer(format!("channel read failed: {}", e)));
            }
        }

        if channel.eof() {
            break;
        }
        std::thread::sleep(ctx.params.poll_interval);
    }

    if !pending_line.is_empty() {
        ctx.sink.emit(&FleetEvent::Remote {
            host: spec.host.clone(),
            line: std::mem::take(&mut pending_line),
        });
    }

    // Actively close the channel: on timeout or cancellation the remote side
    // is only bounded by its own wrapper, and our descriptors should not wait
    // for it.
    session.set_nonblocking(false);
    let _ = channel.close();
    let _ = channel.wait_close();
    let exit_code = channel.exit_status().ok();

    ctx.sink.emit(&FleetEvent::Notice {
        host: spec.host.clone(),
        text: "Disconnected".into(),
    });
    session.close();

    match cancelled {
        Some(WorkerError::Timeout(d)) => {
            info!("[{}] local timeout reached, channel closed", spec.host);
            Err(WorkerError::Timeout(d))
        }
        Some(e) => Err(e),
        None => Ok(exit_code),
    }
}

fn emit_complete_lines(ctx: &RunContext, host: &str, pending: &mut String) {
    while let Some(idx) = pending.find('\n') {
        let mut line: String = pending.drain(..=idx).collect();
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        ctx.sink.emit(&FleetEvent::Remote {
            host: host.to_string(),
            line,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::events::EventSink;
    use crate::fleet::types::WorkerParams;

    fn test_ctx() -> (RunContext, crate::fleet::events::CapturedOutput) {
        let (sink, captured) = EventSink::capture();
        (RunContext::new(WorkerParams::default(), sink), captured)
    }

    fn unreachable_spec() -> NodeSpec {
        NodeSpec {
            host: "127.0.0.1".into(),
            port: 1, // nothing listens here
            username: "reip".into(),
            password: Some("reip".into()),
            label: None,
        }
    }

    #[test]
    fn preset_shutdown_stops_before_connecting() {
        let (ctx, captured) = test_ctx();
        ctx.shutdown.trigger();
        let spec = NodeSpec {
            // unroutable test address; a connect attempt would hang, so a
            // fast stop proves no connection was opened
            host: "192.0.2.1".into(),
            port: 22,
            username: "reip".into(),
            password: Some("reip".into()),
            label: None,
        };
        ctx.ledger.seed(vec![spec.host.clone()]);
        let started = Instant::now();
        pull_node(&ctx, &spec, "/media/reip/ssd/data", Path::new("/tmp/unused"));
        assert!(started.elapsed().as_secs() < 2);
        assert_eq!(ctx.ledger.snapshot()["192.0.2.1"], HostOutcome::Stopped);
        assert!(captured.contents().contains("COMPLETE 192.0.2.1 ERROR"));
    }

    #[test]
    fn refused_tcp_yields_connect_error() {
        let (ctx, _captured) = test_ctx();
        let spec = unreachable_spec();
        ctx.ledger.seed(vec![spec.host.clone()]);
        pull_node(&ctx, &spec, "/media/reip/ssd/data", Path::new("/tmp/unused"));
        match &ctx.ledger.snapshot()["127.0.0.1"] {
            HostOutcome::Error { error } => assert!(error.contains("tcp"), "got: {}", error),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn exec_mode_records_error_for_unreachable_host() {
        let (ctx, captured) = test_ctx();
        let spec = unreachable_spec();
        ctx.ledger.seed(vec![spec.host.clone()]);
        exec_node(&ctx, &spec, "echo hi");
        assert!(matches!(
            ctx.ledger.snapshot()["127.0.0.1"],
            HostOutcome::Error { .. }
        ));
        assert!(captured.contents().contains("Session ended"));
    }

    #[test]
    fn registry_removal_reads_as_stop_once_registered() {
        let (ctx, _captured) = test_ctx();
        let host = "192.168.0.108";
        let mut guard = CancelGuard::new(&ctx, host);
        // before registration an empty registry means "not connected yet"
        assert!(guard.check().is_ok());
        ctx.registry
            .register(host, SessionRecord::new("reip"))
            .unwrap();
        guard.registered = true;
        assert!(guard.check().is_ok());
        ctx.registry.stop(host);
        assert!(matches!(guard.check(), Err(WorkerError::Stopped)));
    }

    #[test]
    fn elapsed_deadline_reads_as_timeout() {
        let (sink, _captured) = EventSink::capture();
        let params = WorkerParams {
            session_timeout: std::time::Duration::ZERO,
            ..WorkerParams::default()
        };
        let ctx = RunContext::new(params, sink);
        let guard = CancelGuard::new(&ctx, "192.168.0.108");
        assert!(matches!(guard.check(), Err(WorkerError::Timeout(_))));
    }

    #[test]
    fn partial_lines_are_buffered_until_complete() {
        let (ctx, captured) = test_ctx();
        let mut pending = String::from("first ");
        emit_complete_lines(&ctx, "h", &mut pending);
        assert!(captured.lines().is_empty());
        pending.push_str("half\r\nsecond\n");
        emit_complete_lines(&ctx, "h", &mut pending);
        assert_eq!(captured.lines(), vec!["[h] first half", "[h] second"]);
        assert!(pending.is_empty());
    }
}
