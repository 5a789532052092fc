// ── NodeSession – one SSH connection to one host ─────────────────────────────
//
// Exclusively owned by its host worker. Connect is a single attempt per run:
// a refused TCP probe, failed handshake, or failed auth is final, retries are
// an operator concern.

use crate::fleet::error::WorkerError;
use crate::fleet::types::{NodeSpec, WorkerParams};
use log::{debug, info};
use ssh2::{Channel, Session, Sftp};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

pub struct NodeSession {
    host: String,
    session: Session,
    #[allow(dead_code)] // held to keep the TCP connection alive
    tcp: TcpStream,
    closed: bool,
}

impl NodeSession {
    // ── Connect ──────────────────────────────────────────────────────────────

    pub fn connect(spec: &NodeSpec, params: &WorkerParams) -> Result<Self, WorkerError> {
        let addr = spec.addr();
        let connect = |m: String| WorkerError::Connect(m);

        let sock_addr = addr
            .to_socket_addrs()
            .map_err(|e| connect(format!("tcp: cannot resolve '{}': {}", addr, e)))?
            .next()
            .ok_or_else(|| connect(format!("tcp: no address for '{}'", addr)))?;

        // Quick TCP probe: fails faster and more precisely than letting the
        // handshake time out against a dead port.
        let tcp = TcpStream::connect_timeout(&sock_addr, params.connect_timeout)
            .map_err(|e| connect(format!("tcp: connect to {} failed: {}", addr, e)))?;
        tcp.set_read_timeout(Some(params.connect_timeout * 2)).ok();
        tcp.set_write_timeout(Some(params.connect_timeout)).ok();

        let mut session = Session::new()
            .map_err(|e| connect(format!("handshake: session init failed: {}", e)))?;
        session.set_timeout(params.connect_timeout.as_millis() as u32);
        session.set_tcp_stream(
            tcp.try_clone()
                .map_err(|e| connect(format!("tcp: clone failed: {}", e)))?,
        );
        session
            .handshake()
            .map_err(|e| connect(format!("handshake: {}", e)))?;

        Self::authenticate(&mut session, spec)?;
        info!("connected to {} as {}", addr, spec.username);

        // Blocking-call timeout no longer applies; per-operation bounds are
        // set where needed.
        session.set_timeout(0);

        Ok(NodeSession {
            host: spec.host.clone(),
            session,
            tcp,
            closed: false,
        })
    }

    fn authenticate(session: &mut Session, spec: &NodeSpec) -> Result<(), WorkerError> {
        let password = spec
            .password
            .as_deref()
            .ok_or_else(|| WorkerError::Connect(format!("auth: no credential for {}", spec.host)))?;

        if session.userauth_password(&spec.username, password).is_ok() && session.authenticated() {
            return Ok(());
        }

        // Keyboard-interactive fallback for servers that disable plain
        // password auth but prompt for the same credential.
        struct PasswordPrompt<'a> {
            password: &'a str,
        }

        impl ssh2::KeyboardInteractivePrompt for PasswordPrompt<'_> {
            fn prompt(
                &mut self,
                _username: &str,
                _instructions: &str,
                prompts: &[ssh2::Prompt],
            ) -> Vec<String> {
                prompts.iter().map(|_| self.password.to_string()).collect()
            }
        }

        let mut prompt = PasswordPrompt { password };
        session
            .userauth_keyboard_interactive(&spec.username, &mut prompt)
            .map_err(|e| WorkerError::Connect(format!("auth: {}", e)))?;

        if session.authenticated() {
            Ok(())
        } else {
            Err(WorkerError::Connect(format!(
                "auth: no method succeeded for {}@{}",
                spec.username, spec.host
            )))
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    // ── One-shot exec (used by the pre-flight probe) ─────────────────────────

    /// Run a short remote command and capture its streams, bounded by
    /// `timeout` at the transport level.
    pub fn exec_capture(&self, command: &str, timeout: Duration) -> Result<ExecOutput, String> {
        self.session.set_timeout(timeout.as_millis() as u32);
        let result = self.exec_capture_inner(command);
        self.session.set_timeout(0);
        result
    }

    fn exec_capture_inner(&self, command: &str) -> Result<ExecOutput, String> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| format!("channel open failed: {}", e))?;
        channel
            .exec(command)
            .map_err(|e| format!("exec '{}' failed: {}", command, e))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| format!("stdout read failed: {}", e))?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| format!("stderr read failed: {}", e))?;

        channel
            .wait_close()
            .map_err(|e| format!("channel close failed: {}", e))?;
        let exit_status = channel
            .exit_status()
            .map_err(|e| format!("exit status unavailable: {}", e))?;

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_status,
        })
    }

    // ── Streamed exec ────────────────────────────────────────────────────────

    /// Start a remote command on a PTY (stderr merged into stdout) and return
    /// the open channel for the caller's read loop. The caller is responsible
    /// for draining it and for an explicit close when it stops reading early.
    pub fn open_command(&self, command: &str) -> Result<Channel, String> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| format!("channel open failed: {}", e))?;
        channel
            .request_pty("xterm", None, None)
            .map_err(|e| format!("pty request failed: {}", e))?;
        channel
            .exec(command)
            .map_err(|e| format!("exec failed: {}", e))?;
        Ok(channel)
    }

    /// Toggle non-blocking reads for the poll loop around a streamed command.
    pub fn set_nonblocking(&self, on: bool) {
        self.session.set_blocking(!on);
    }

    // ── SFTP ─────────────────────────────────────────────────────────────────

    pub fn sftp(&self) -> Result<Sftp, String> {
        self.session
            .sftp()
            .map_err(|e| format!("sftp channel failed: {}", e))
    }

    // ── Close ────────────────────────────────────────────────────────────────

    /// Graceful disconnect. Idempotent; also runs on drop so every worker
    /// exit path releases the connection.
    pub fn close(&mut self) {
        if !self.closed {
            self.session.set_blocking(true);
            let _ = self
                .session
                .disconnect(None, "session complete", None);
            self.closed = true;
            debug!("session to {} closed", self.host);
        }
    }
}

impl Drop for NodeSession {
    fn drop(&mut self) {
        self.close();
    }
}
