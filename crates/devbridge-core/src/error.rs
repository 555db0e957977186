//! Error types for devbridge

use thiserror::Error;

/// Result type for devbridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// devbridge error types
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server installation could not be located
    #[error("Installation error: {0}")]
    Install(String),

    /// Server process spawn/control failure
    #[error("Process error: {0}")]
    Process(String),

    /// Transport (socket/WebSocket) error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected protocol traffic
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Handshake rejected or timed out
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Console command could not be delivered
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// No server process is under agent control
    #[error("Agent is not attached to a server process")]
    AgentUnavailable,

    /// Too many clients or buffered events
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Transport(err.to_string())
    }
}

/// Wire-level error codes carried in protocol Error messages
pub mod error_codes {
    pub const HANDSHAKE_REQUIRED: i32 = 1;
    pub const VERSION_MISMATCH: i32 = 2;
    pub const AGENT_UNAVAILABLE: i32 = 3;
    pub const COMMAND_FAILED: i32 = 4;
    pub const BAD_REQUEST: i32 = 5;
    pub const CAPACITY_EXCEEDED: i32 = 6;
}
