//! Wire protocol between the devbridge hub and development tools
//!
//! Messages are serialized as JSON with internally-tagged enums and carried
//! in WebSocket text frames (the socket provides framing, so there is no
//! length prefix). Format: {"Type": "MessageType", ...fields}
//!
//! Two envelopes exist: [`AgentMessage`] flows bridge -> client,
//! [`ClientMessage`] flows client -> bridge. Requests carry a client-chosen
//! `request_id` which the bridge echoes on exactly one terminal response, so
//! a single connection can pipeline requests.

use devbridge_core::{Capability, CommandInfo, LogEvent, ServerState, Suggestion};
use serde::{Deserialize, Serialize};

/// Protocol revision negotiated in the hello exchange
pub const PROTOCOL_VERSION: u32 = 1;

/// Bridge software version reported in the hello
pub const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// WebSocket request path served by the hub
pub const WS_PATH: &str = "/dev-bridge";

/// Messages sent from the bridge to a connected client
///
/// Note: `rename_all` on enums only affects variant names, not field names
/// inside variants. Each field must be explicitly renamed for PascalCase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "PascalCase")]
pub enum AgentMessage {
    /// First message on every connection, sent before the client hello
    Hello {
        #[serde(rename = "ProtocolVersion")]
        protocol_version: u32,
        #[serde(rename = "BridgeVersion")]
        bridge_version: String,
        #[serde(rename = "Capabilities")]
        capabilities: Vec<Capability>,
        #[serde(rename = "ServerState")]
        server_state: ServerState,
    },

    /// One server log record
    Log {
        #[serde(flatten)]
        event: LogEvent,
    },

    /// Server lifecycle transition
    State {
        #[serde(rename = "State")]
        state: ServerState,
        #[serde(rename = "ExitCode")]
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },

    /// Command registry response
    Commands {
        #[serde(rename = "RequestId")]
        request_id: u64,
        #[serde(rename = "Commands")]
        commands: Vec<CommandInfo>,
    },

    /// Completion response
    Suggestions {
        #[serde(rename = "RequestId")]
        request_id: u64,
        #[serde(rename = "Suggestions")]
        suggestions: Vec<Suggestion>,
    },

    /// Command was written to the server console; output, if any, arrives
    /// interleaved in the log stream
    CommandAccepted {
        #[serde(rename = "RequestId")]
        request_id: u64,
    },

    /// Error response; `request_id` is None for connection-level errors
    Error {
        #[serde(rename = "RequestId")]
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        #[serde(rename = "Code")]
        code: i32,
        #[serde(rename = "Message")]
        message: String,
    },
}

/// Messages sent from a client to the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "PascalCase")]
pub enum ClientMessage {
    /// Must be the first message on the connection
    Hello {
        #[serde(rename = "ProtocolVersion")]
        protocol_version: u32,
        #[serde(rename = "ClientName")]
        client_name: String,
        #[serde(rename = "ClientVersion")]
        client_version: String,
    },

    /// Request the server's console command registry
    GetCommands {
        #[serde(rename = "RequestId")]
        request_id: u64,
    },

    /// Request completions for a console input
    GetSuggestions {
        #[serde(rename = "RequestId")]
        request_id: u64,
        #[serde(rename = "Input")]
        input: String,
        #[serde(rename = "Cursor")]
        cursor: usize,
    },

    /// Execute a console command on the server
    ExecuteCommand {
        #[serde(rename = "RequestId")]
        request_id: u64,
        #[serde(rename = "Command")]
        command: String,
    },
}

impl ClientMessage {
    /// Request id carried by this message, if it is a request
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ClientMessage::Hello { .. } => None,
            ClientMessage::GetCommands { request_id }
            | ClientMessage::GetSuggestions { request_id, .. }
            | ClientMessage::ExecuteCommand { request_id, .. } => Some(*request_id),
        }
    }
}

impl AgentMessage {
    /// Request id this response answers, if any
    pub fn request_id(&self) -> Option<u64> {
        match self {
            AgentMessage::Commands { request_id, .. }
            | AgentMessage::Suggestions { request_id, .. }
            | AgentMessage::CommandAccepted { request_id } => Some(*request_id),
            AgentMessage::Error { request_id, .. } => *request_id,
            _ => None,
        }
    }
}

/// Serialize a bridge->client message to JSON
pub fn serialize_agent(msg: &AgentMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Deserialize a bridge->client message from JSON
pub fn deserialize_agent(text: &str) -> Result<AgentMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Serialize a client->bridge message to JSON
pub fn serialize_client(msg: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Deserialize a client->bridge message from JSON
pub fn deserialize_client(text: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbridge_core::{LogLevel, error_codes};

    #[test]
    fn test_hello_roundtrip() {
        let msg = AgentMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            bridge_version: "0.1.0".into(),
            capabilities: vec![Capability::Logs, Capability::Commands],
            server_state: ServerState::Starting,
        };

        let json = serialize_agent(&msg).unwrap();
        let decoded = deserialize_agent(&json).unwrap();

        match decoded {
            AgentMessage::Hello {
                protocol_version,
                capabilities,
                server_state,
                ..
            } => {
                assert_eq!(protocol_version, 1);
                assert_eq!(capabilities.len(), 2);
                assert_eq!(server_state, ServerState::Starting);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_client_hello_from_tool() {
        // Exact JSON format expected from tools
        let json = r#"{"Type":"Hello","ProtocolVersion":1,"ClientName":"intellij-plugin","ClientVersion":"0.3.2"}"#;

        let msg = deserialize_client(json).unwrap();
        match msg {
            ClientMessage::Hello {
                protocol_version,
                client_name,
                client_version,
            } => {
                assert_eq!(protocol_version, 1);
                assert_eq!(client_name, "intellij-plugin");
                assert_eq!(client_version, "0.3.2");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_log_event_is_flattened() {
        let msg = AgentMessage::Log {
            event: LogEvent {
                timestamp_ms: 1700000000000,
                level: LogLevel::Warn,
                logger: "world".into(),
                message: "chunk load stalled".into(),
                thread: None,
                throwable: None,
            },
        };

        let json = serialize_agent(&msg).unwrap();
        assert!(json.contains("\"Type\":\"Log\""));
        // Flattened: event fields sit at the top level, no "Event" wrapper
        assert!(json.contains("\"Level\":\"Warn\""));
        assert!(json.contains("\"Logger\":\"world\""));
        assert!(!json.contains("\"Event\""));
    }

    #[test]
    fn test_execute_command_format() {
        let json = r#"{"Type":"ExecuteCommand","RequestId":7,"Command":"gamemode creative"}"#;

        let msg = deserialize_client(json).unwrap();
        assert_eq!(msg.request_id(), Some(7));
        match msg {
            ClientMessage::ExecuteCommand { command, .. } => {
                assert_eq!(command, "gamemode creative");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_error_without_request_id_omits_field() {
        let msg = AgentMessage::Error {
            request_id: None,
            code: error_codes::HANDSHAKE_REQUIRED,
            message: "hello required".into(),
        };

        let json = serialize_agent(&msg).unwrap();
        assert!(!json.contains("RequestId"));
        assert!(json.contains("\"Code\":1"));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        // Newer peers may add fields; older ones must not choke on them
        let json = r#"{"Type":"GetCommands","RequestId":3,"Flags":["future"]}"#;
        let msg = deserialize_client(json).unwrap();
        assert_eq!(msg.request_id(), Some(3));
    }

    #[test]
    fn test_state_exit_code() {
        let msg = AgentMessage::State {
            state: ServerState::Crashed,
            exit_code: Some(134),
        };
        let json = serialize_agent(&msg).unwrap();
        assert!(json.contains("\"State\":\"Crashed\""));
        assert!(json.contains("\"ExitCode\":134"));

        let quiet = AgentMessage::State {
            state: ServerState::Running,
            exit_code: None,
        };
        let json = serialize_agent(&quiet).unwrap();
        assert!(!json.contains("ExitCode"));
    }
}
