//! Remote session abstraction
//!
//! The install orchestrator and the backup engine only talk to the device
//! through [`RemoteSession`]; [`Connector`] opens sessions. The SSH/SFTP
//! implementation lives in [`ssh`].

pub mod resolver;
pub mod ssh;

use std::fmt;
use std::net::Ipv6Addr;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::errors::ProvisionError;

/// One network address at which the device accepts SSH sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Human-readable path name, e.g. "wifi" or "usb"
    pub label: String,

    /// Host name or IP address, optionally with `:port`
    pub address: String,

    /// Port used when `address` carries none
    pub port: u16,
}

impl Endpoint {
    pub fn new(label: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            label: label.into(),
            address: address.into(),
            port,
        }
    }

    /// `host:port` string suitable for socket address resolution.
    ///
    /// IPv6 literals are bracketed; `[addr]:port` and `host:port` are kept.
    pub fn socket_addr(&self) -> String {
        let address = self.address.as_str();
        if let Some(rest) = address.strip_prefix('[') {
            let has_port = rest
                .split_once(']')
                .and_then(|(_, tail)| tail.strip_prefix(':'))
                .is_some_and(|port| port.parse::<u16>().is_ok());
            return if has_port {
                address.to_string()
            } else {
                format!("{}:{}", address, self.port)
            };
        }
        if address.parse::<Ipv6Addr>().is_ok() {
            return format!("[{}]:{}", address, self.port);
        }

        let has_port = address
            .rsplit_once(':')
            .map(|(host, port)| !host.contains(':') && port.parse::<u16>().is_ok())
            .unwrap_or(false);
        if has_port {
            address.to_string()
        } else {
            format!("{}:{}", address, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.address)
    }
}

/// Login credentials for the device
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Quote a remote path for the device shell.
///
/// A leading `~/` stays unquoted so the remote shell expands it.
pub fn shell_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) => format!("~/{}", shell_words::quote(rest)),
        None if path == "~" => path.to_string(),
        None => shell_words::quote(path).into_owned(),
    }
}

/// Error for a remote command that did not finish within `limit`
pub fn exec_timed_out(command: &str, limit: Duration) -> ProvisionError {
    ProvisionError::RemoteExecutionError {
        command: command.to_string(),
        reason: format!("timed out after {:?}", limit),
    }
}

/// An open, authenticated session with its file-transfer channel
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Endpoint this session is connected to
    fn endpoint(&self) -> &Endpoint;

    /// Run a shell command and wait for it to finish
    async fn exec(&self, command: &str) -> Result<CommandOutput, ProvisionError>;

    /// Run a shell command, giving up after `limit`.
    ///
    /// Transports whose reads block a worker thread override this and bound
    /// the wait themselves.
    async fn exec_with_timeout(
        &self,
        command: &str,
        limit: Duration,
    ) -> Result<CommandOutput, ProvisionError> {
        tokio::time::timeout(limit, self.exec(command))
            .await
            .map_err(|_| exec_timed_out(command, limit))?
    }

    /// Upload a local file to `remote_path`, returning the bytes written
    async fn put_file(&self, local_path: &Path, remote_path: &str) -> Result<u64, ProvisionError>;

    /// Download `remote_path` to a local file, returning the bytes read
    async fn get_file(&self, remote_path: &str, local_path: &Path) -> Result<u64, ProvisionError>;

    /// Close the session. Safe to call more than once.
    async fn close(&self) -> Result<(), ProvisionError>;
}

/// Opens sessions to a single endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and authenticate. `timeout` bounds the connect and handshake;
    /// `None` leaves the transport default in place.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        credentials: &Credentials,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn RemoteSession>, ProvisionError>;
}
