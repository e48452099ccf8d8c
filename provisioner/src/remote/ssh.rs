//! SSH/SFTP transport backed by libssh2.
//!
//! libssh2 is blocking, so every operation runs on the blocking thread pool.

use std::fs;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use ssh2::{ErrorCode, Session};
use tracing::{debug, warn};

use crate::errors::ProvisionError;
use crate::remote::{exec_timed_out, CommandOutput, Connector, Credentials, Endpoint, RemoteSession};

/// libssh2 return code of a blocking call that ran past the session timeout
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

/// Connector that opens password-authenticated SSH sessions
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

impl SshConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn RemoteSession>, ProvisionError> {
        let target = endpoint.clone();
        let username = credentials.username.clone();
        let password = credentials.password.expose_secret().to_string();

        let session = tokio::task::spawn_blocking(move || {
            open_session(&target, &username, &password, timeout)
        })
        .await??;

        Ok(Box::new(SshSession {
            endpoint: endpoint.clone(),
            session,
            closed: AtomicBool::new(false),
            stalled: Arc::new(AtomicBool::new(false)),
        }))
    }
}

fn open_session(
    endpoint: &Endpoint,
    username: &str,
    password: &str,
    timeout: Option<Duration>,
) -> Result<Session, ProvisionError> {
    let attempt_err = |reason: String| ProvisionError::ConnectAttemptError {
        endpoint: endpoint.to_string(),
        reason,
    };

    let addr = resolve_addr(&endpoint.socket_addr()).map_err(|e| attempt_err(e.to_string()))?;
    let tcp = match timeout {
        Some(limit) => TcpStream::connect_timeout(&addr, limit),
        None => TcpStream::connect(addr),
    }
    .map_err(|e| attempt_err(format!("TCP connect to {addr} failed: {e}")))?;

    let mut session = Session::new().map_err(|e| attempt_err(e.to_string()))?;
    session.set_tcp_stream(tcp);
    if let Some(limit) = timeout {
        session.set_timeout(timeout_millis(limit));
    }
    session
        .handshake()
        .map_err(|e| attempt_err(format!("SSH handshake failed: {e}")))?;
    session
        .userauth_password(username, password)
        .map_err(|e| attempt_err(format!("authentication failed: {e}")))?;
    if !session.authenticated() {
        return Err(attempt_err("authentication rejected".to_string()));
    }

    // Only the connect phase is bounded
    session.set_timeout(0);
    debug!("SSH session established with {}", endpoint);
    Ok(session)
}

fn resolve_addr(addr: &str) -> io::Result<SocketAddr> {
    addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no address found for {addr}"))
    })
}

/// libssh2 timeout in milliseconds; 0 would mean "wait forever"
fn timeout_millis(limit: Duration) -> u32 {
    limit.as_millis().clamp(1, u32::MAX as u128) as u32
}

fn is_timeout(err: &ssh2::Error) -> bool {
    err.code() == ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT)
}

/// Command output may hold any bytes; invalid UTF-8 is replaced
fn decode_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Run `command` on a fresh channel and collect its output.
///
/// With a `limit`, a read or exec that hits the session timeout marks the
/// session as stalled and reports the command as timed out.
fn run_command(
    session: &Session,
    command: &str,
    limit: Option<Duration>,
    stalled: &AtomicBool,
) -> Result<CommandOutput, ProvisionError> {
    let fail = |reason: String| ProvisionError::RemoteExecutionError {
        command: command.to_string(),
        reason,
    };
    let timed_out = || {
        stalled.store(true, Ordering::SeqCst);
        exec_timed_out(command, limit.unwrap_or_default())
    };
    let ssh_err = |context: &str, e: ssh2::Error| {
        if limit.is_some() && is_timeout(&e) {
            timed_out()
        } else {
            fail(format!("{context}: {e}"))
        }
    };
    let read_err = |context: &str, e: io::Error| {
        if limit.is_some() && e.kind() == io::ErrorKind::TimedOut {
            timed_out()
        } else {
            fail(format!("{context}: {e}"))
        }
    };

    let mut channel = session
        .channel_session()
        .map_err(|e| ssh_err("cannot open channel", e))?;
    channel.exec(command).map_err(|e| ssh_err("exec", e))?;

    let mut stdout = Vec::new();
    channel
        .read_to_end(&mut stdout)
        .map_err(|e| read_err("reading stdout", e))?;
    let mut stderr = Vec::new();
    channel
        .stderr()
        .read_to_end(&mut stderr)
        .map_err(|e| read_err("reading stderr", e))?;

    channel.wait_close().map_err(|e| ssh_err("closing channel", e))?;
    let exit_status = channel
        .exit_status()
        .map_err(|e| ssh_err("reading exit status", e))?;

    Ok(CommandOutput {
        exit_status,
        stdout: decode_output(&stdout),
        stderr: decode_output(&stderr),
    })
}

/// An authenticated libssh2 session
pub struct SshSession {
    endpoint: Endpoint,
    session: Session,
    closed: AtomicBool,

    // set when a bounded command timed out with its channel still open
    stalled: Arc<AtomicBool>,
}

impl SshSession {
    async fn blocking<T, F>(&self, op: F) -> Result<T, ProvisionError>
    where
        T: Send + 'static,
        F: FnOnce(Session) -> Result<T, ProvisionError> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProvisionError::StateError(format!(
                "session to {} is closed",
                self.endpoint
            )));
        }
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || op(session)).await?
    }

    async fn exec_bounded(
        &self,
        command: &str,
        limit: Option<Duration>,
    ) -> Result<CommandOutput, ProvisionError> {
        let command = command.to_string();
        let stalled = Arc::clone(&self.stalled);
        self.blocking(move |session| {
            if let Some(limit) = limit {
                session.set_timeout(timeout_millis(limit));
            }
            let output = run_command(&session, &command, limit, &stalled);
            if limit.is_some() {
                session.set_timeout(0);
            }
            output
        })
        .await
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput, ProvisionError> {
        self.exec_bounded(command, None).await
    }

    /// Bounded by the libssh2 session timeout, so a hung command releases
    /// the worker thread and the session lock when `limit` expires
    async fn exec_with_timeout(
        &self,
        command: &str,
        limit: Duration,
    ) -> Result<CommandOutput, ProvisionError> {
        self.exec_bounded(command, Some(limit)).await
    }

    async fn put_file(&self, local_path: &Path, remote_path: &str) -> Result<u64, ProvisionError> {
        let local_path = local_path.to_path_buf();
        let remote_path = remote_path.to_string();
        self.blocking(move |session| {
            let transfer_err = |reason: String| ProvisionError::TransferError {
                path: local_path.display().to_string(),
                reason,
            };

            let mut source = fs::File::open(&local_path)
                .map_err(|e| transfer_err(format!("cannot read local file: {e}")))?;
            let sftp = session
                .sftp()
                .map_err(|e| transfer_err(format!("cannot open SFTP channel: {e}")))?;
            let mut target = sftp
                .create(Path::new(&remote_path))
                .map_err(|e| transfer_err(format!("cannot create {remote_path}: {e}")))?;

            io::copy(&mut source, &mut target)
                .map_err(|e| transfer_err(format!("writing {remote_path}: {e}")))
        })
        .await
    }

    async fn get_file(&self, remote_path: &str, local_path: &Path) -> Result<u64, ProvisionError> {
        let local_path: PathBuf = local_path.to_path_buf();
        let remote_path = remote_path.to_string();
        self.blocking(move |session| {
            let transfer_err = |reason: String| ProvisionError::TransferError {
                path: remote_path.clone(),
                reason,
            };

            let sftp = session
                .sftp()
                .map_err(|e| transfer_err(format!("cannot open SFTP channel: {e}")))?;
            let mut source = sftp
                .open(Path::new(&remote_path))
                .map_err(|e| transfer_err(format!("cannot open remote file: {e}")))?;
            let mut target = fs::File::create(&local_path).map_err(|e| {
                transfer_err(format!("cannot create {}: {e}", local_path.display()))
            })?;

            io::copy(&mut source, &mut target)
                .map_err(|e| transfer_err(format!("reading remote file: {e}")))
        })
        .await
    }

    async fn close(&self) -> Result<(), ProvisionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.stalled.load(Ordering::SeqCst) {
            // a command is still running remotely; dropping the session
            // closes the socket without waiting on it
            warn!("Dropping stalled SSH session with {}", self.endpoint);
            return Ok(());
        }
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            session
                .disconnect(None, "rmprov run finished", None)
                .map_err(|e| ProvisionError::Internal(format!("SSH disconnect failed: {e}")))
        })
        .await??;
        debug!("SSH session with {} closed", self.endpoint);
        Ok(())
    }
}
