// ── Health probe – stateless one-shot TCP + auth check per host ──────────────
//
// No concurrency, no session reuse: a quick answer to "would a run against
// this node even connect". Never errors; an unreachable or unauthenticated
// node is simply down.

use crate::fleet::types::NodeSpec;
use log::debug;
use ssh2::Session;
use std::collections::BTreeMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// True when TCP connect, handshake and authentication all succeed within
/// `timeout`.
pub fn check_node(spec: &NodeSpec, timeout: Duration) -> bool {
    match try_connect(spec, timeout) {
        Ok(()) => true,
        Err(reason) => {
            debug!("health probe for {} failed: {}", spec.host, reason);
            false
        }
    }
}

fn try_connect(spec: &NodeSpec, timeout: Duration) -> Result<(), String> {
    let addr = spec.addr();
    let sock_addr = addr
        .to_socket_addrs()
        .map_err(|e| format!("resolve: {}", e))?
        .next()
        .ok_or_else(|| format!("no address for '{}'", addr))?;

    let tcp =
        TcpStream::connect_timeout(&sock_addr, timeout).map_err(|e| format!("tcp: {}", e))?;
    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();

    let mut session = Session::new().map_err(|e| format!("session init: {}", e))?;
    session.set_timeout(timeout.as_millis() as u32);
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| format!("handshake: {}", e))?;

    let password = spec
        .password
        .as_deref()
        .ok_or_else(|| "no credential configured".to_string())?;
    session
        .userauth_password(&spec.username, password)
        .map_err(|e| format!("auth: {}", e))?;

    if session.authenticated() {
        let _ = session.disconnect(None, "health probe complete", None);
        Ok(())
    } else {
        Err("auth: not authenticated".into())
    }
}

/// Probe every node in order and map host → "up" / "down".
pub fn run_health_check(nodes: &[NodeSpec], timeout: Duration) -> BTreeMap<String, String> {
    nodes
        .iter()
        .map(|spec| {
            let status = if check_node(spec, timeout) { "up" } else { "down" };
            (spec.host.clone(), status.to_string())
        })
        .collect()
}
