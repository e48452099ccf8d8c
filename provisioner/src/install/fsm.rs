//! Finite state machine for an install run

use serde::{Deserialize, Serialize};

/// Install run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallState {
    /// No run started yet
    Idle,

    /// Resolving a session to the device
    Connecting,

    /// Preparing the base directory or uploading a script
    Transferring,

    /// Running a script on the device
    Executing,

    /// Every script installed
    Completed,

    /// Run aborted
    Failed,
}

impl InstallState {
    /// Whether the run has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallState::Completed | InstallState::Failed)
    }
}

/// Install run event
#[derive(Debug, Clone)]
pub enum InstallEvent {
    /// Start a run
    Start,

    /// A session is open
    Connected,

    /// Begin uploading a script
    Transfer,

    /// Begin running an uploaded script
    Execute,

    /// Plan exhausted without error
    Finish,

    /// Run aborted with a cause
    Fail(String),
}

/// Install FSM
#[derive(Debug, Clone)]
pub struct InstallFsm {
    state: InstallState,
    error: Option<String>,
}

impl InstallFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: InstallState::Idle,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> InstallState {
        self.state
    }

    /// Cause of the last failure, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: InstallEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            // A new run may start from rest or after a previous run ended
            (InstallState::Idle | InstallState::Completed | InstallState::Failed, InstallEvent::Start) => {
                self.error = None;
                InstallState::Connecting
            }

            (InstallState::Connecting, InstallEvent::Connected) => InstallState::Transferring,

            (InstallState::Transferring | InstallState::Executing, InstallEvent::Transfer) => {
                InstallState::Transferring
            }
            (InstallState::Transferring, InstallEvent::Execute) => InstallState::Executing,

            (InstallState::Transferring | InstallState::Executing, InstallEvent::Finish) => {
                InstallState::Completed
            }

            (
                InstallState::Connecting | InstallState::Transferring | InstallState::Executing,
                InstallEvent::Fail(err),
            ) => {
                self.error = Some(err.clone());
                InstallState::Failed
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for InstallFsm {
    fn default() -> Self {
        Self::new()
    }
}
