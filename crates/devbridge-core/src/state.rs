//! Server lifecycle states

use serde::{Deserialize, Serialize};

/// Lifecycle state of the supervised server process
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ServerState {
    /// No server process is under agent control
    Detached,
    /// Process spawned, not yet serving
    Starting,
    /// Ready pattern observed in the log stream
    Running,
    /// Shutdown requested, waiting for exit
    Stopping,
    /// Process exited after a requested stop (or with success)
    Stopped,
    /// Process exited unrequested with a failure status
    Crashed,
}

impl ServerState {
    /// Whether the server console can accept commands in this state
    pub fn accepts_commands(&self) -> bool {
        matches!(self, ServerState::Starting | ServerState::Running)
    }

    /// Whether this is a terminal state for the current process
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerState::Detached | ServerState::Stopped | ServerState::Crashed
        )
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServerState::Detached => "detached",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
            ServerState::Stopped => "stopped",
            ServerState::Crashed => "crashed",
        };
        write!(f, "{}", name)
    }
}
