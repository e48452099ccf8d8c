//! Error types for rmprov

use thiserror::Error;

/// Main error type for provisioning and backup runs
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// No endpoint could be reached or authenticated. Keeps the last cause.
    #[error("Connection error: could not reach the device via {}: {cause}", .endpoints.join(", "))]
    ConnectionError {
        endpoints: Vec<String>,
        #[source]
        cause: Box<ProvisionError>,
    },

    /// A single connection attempt failed (network, handshake or authentication)
    #[error("Connect to {endpoint} failed: {reason}")]
    ConnectAttemptError { endpoint: String, reason: String },

    #[error("Transfer error ({path}): {reason}")]
    TransferError { path: String, reason: String },

    #[error("Remote execution error ({command}): {reason}")]
    RemoteExecutionError { command: String, reason: String },

    /// An install step failed; names the offending script
    #[error("Script '{script}' failed: {cause}")]
    ScriptError {
        script: String,
        #[source]
        cause: Box<ProvisionError>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProvisionError {
    /// Short category label included in failure log lines
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisionError::IoError(_) => "io",
            ProvisionError::JsonError(_) => "json",
            ProvisionError::ConnectionError { .. } | ProvisionError::ConnectAttemptError { .. } => {
                "connection"
            }
            ProvisionError::TransferError { .. } => "transfer",
            ProvisionError::RemoteExecutionError { .. } => "remote-execution",
            ProvisionError::ScriptError { cause, .. } => cause.kind(),
            ProvisionError::ConfigError(_) => "configuration",
            ProvisionError::ServerError(_) => "server",
            ProvisionError::StateError(_) => "state",
            ProvisionError::Internal(_) => "internal",
        }
    }
}

impl From<config::ConfigError> for ProvisionError {
    fn from(err: config::ConfigError) -> Self {
        ProvisionError::ConfigError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ProvisionError {
    fn from(err: tokio::task::JoinError) -> Self {
        ProvisionError::Internal(format!("blocking task failed: {err}"))
    }
}
