//! WebSocket accept loop
//!
//! Auth happens during the HTTP upgrade: wrong path is a 404, a missing or
//! wrong Bearer token is a 401 and the socket never upgrades.

use crate::config::{HubConfig, TOKEN_ENV};
use crate::history::{self, LogHistory};
use crate::registry::ClientRegistry;
use crate::session;
use devbridge_agent::AgentHandle;
use devbridge_core::{BridgeError, Result};
use devbridge_protocol::WS_PATH;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};

/// The bridge endpoint: owns the listener-side state and the agent handle
pub struct BridgeHub {
    config: HubConfig,
    agent: AgentHandle,
}

impl BridgeHub {
    pub fn new(config: HubConfig, agent: AgentHandle) -> Self {
        Self { config, agent }
    }

    /// Bind the configured address and serve until the process exits
    pub async fn run(self) -> Result<()> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| BridgeError::Transport(format!("Failed to bind {}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serve connections on an already-bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        if self.config.token.is_none() {
            warn!(
                "No auth token configured ({} unset): accepting unauthenticated clients",
                TOKEN_ENV
            );
        }
        let addr = listener
            .local_addr()
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        info!("Bridge listening on ws://{}{}", addr, WS_PATH);

        let registry = Arc::new(Mutex::new(ClientRegistry::new(self.config.max_clients)));
        let history = Arc::new(Mutex::new(LogHistory::new(self.config.log_history)));
        tokio::spawn(history::record(history.clone(), self.agent.subscribe()));

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };
            debug!("Connection from {}", peer);

            let token = self.config.token.clone();
            let agent = self.agent.clone();
            let registry = registry.clone();
            let history = history.clone();
            let handshake_timeout = self.config.handshake_timeout;

            tokio::spawn(async move {
                match accept_connection(stream, token).await {
                    Ok(ws) => {
                        session::run_session(ws, agent, registry, history, handshake_timeout)
                            .await;
                    }
                    Err(e) => debug!("Handshake with {} failed: {}", peer, e),
                }
            });
        }
    }
}

/// Upgrade a TCP connection, enforcing path and Bearer token
async fn accept_connection(
    stream: TcpStream,
    token: Option<String>,
) -> Result<WebSocketStream<TcpStream>> {
    let callback = move |request: &Request, response: Response| {
        if request.uri().path() != WS_PATH {
            return Err(error_response(StatusCode::NOT_FOUND));
        }

        if let Some(token) = &token {
            let authorized = request
                .headers()
                .get("Authorization")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .is_some_and(|presented| presented == token);
            if !authorized {
                return Err(error_response(StatusCode::UNAUTHORIZED));
            }
        }

        Ok(response)
    };

    tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .map_err(|e| BridgeError::Handshake(e.to_string()))
}

fn error_response(status: StatusCode) -> ErrorResponse {
    let mut response = ErrorResponse::new(None);
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbridge_agent::{AgentEvent, AgentRequest};
    use devbridge_client::{BridgeClient, BridgeEvent};
    use devbridge_core::{
        Capability, CommandInfo, LogEvent, LogLevel, ServerState, error_codes,
    };
    use devbridge_protocol::{
        AgentMessage, ClientMessage, PROTOCOL_VERSION, deserialize_agent, serialize_client,
    };
    use futures_util::{SinkExt, StreamExt};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::sync::{broadcast, mpsc};
    use tokio_tungstenite::tungstenite::Message;

    /// Agent stub that serves a one-command registry and acks everything
    fn fake_agent(state: ServerState) -> (AgentHandle, broadcast::Sender<AgentEvent>) {
        let (events, _) = broadcast::channel(64);
        let (request_tx, mut request_rx) = mpsc::channel::<AgentRequest>(16);

        tokio::spawn(async move {
            while let Some(AgentRequest { message, reply }) = request_rx.recv().await {
                let response = match message {
                    ClientMessage::GetCommands { request_id } => AgentMessage::Commands {
                        request_id,
                        commands: vec![CommandInfo {
                            name: "stop".into(),
                            usage: None,
                            description: Some("Shut the server down".into()),
                        }],
                    },
                    ClientMessage::GetSuggestions { request_id, .. } => {
                        AgentMessage::Suggestions {
                            request_id,
                            suggestions: Vec::new(),
                        }
                    }
                    ClientMessage::ExecuteCommand { request_id, .. } => {
                        AgentMessage::CommandAccepted { request_id }
                    }
                    ClientMessage::Hello { .. } => AgentMessage::Error {
                        request_id: None,
                        code: error_codes::BAD_REQUEST,
                        message: "unexpected hello".into(),
                    },
                };
                let _ = reply.send(Ok(response));
            }
        });

        let handle = AgentHandle::new(
            events.clone(),
            request_tx,
            vec![Capability::Logs, Capability::Commands],
            state,
        );
        (handle, events)
    }

    async fn start_hub(config: HubConfig, agent: AgentHandle) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = BridgeHub::new(config, agent);
        tokio::spawn(async move {
            let _ = hub.serve(listener).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_full_client_flow() {
        let (agent, events) = fake_agent(ServerState::Running);
        let config = HubConfig {
            token: Some("sesame".into()),
            ..Default::default()
        };
        let addr = start_hub(config, agent).await;

        let mut client = BridgeClient::connect(
            &format!("ws://{}", addr),
            Some("sesame"),
            "test-tool",
            "0.0.1",
        )
        .await
        .unwrap();

        assert_eq!(client.hello().server_state, ServerState::Running);
        assert!(client.hello().capabilities.contains(&Capability::Commands));

        let commands = client.commands().await.unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].name, "stop");

        client.execute("stop").await.unwrap();

        // Push a live log event and receive it
        events
            .send(AgentEvent::Log(LogEvent::now(
                LogLevel::Info,
                "world",
                "chunk loaded",
            )))
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(5), client.next_event())
            .await
            .unwrap()
            .unwrap();
        match event {
            BridgeEvent::Log(event) => assert_eq!(event.message, "chunk loaded"),
            other => panic!("Expected log event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wrong_token_is_rejected_before_upgrade() {
        let (agent, _events) = fake_agent(ServerState::Running);
        let config = HubConfig {
            token: Some("sesame".into()),
            ..Default::default()
        };
        let addr = start_hub(config, agent).await;

        let err = BridgeClient::connect(
            &format!("ws://{}", addr),
            Some("wrong"),
            "test-tool",
            "0.0.1",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("401"), "got: {}", err);

        let err = BridgeClient::connect(&format!("ws://{}", addr), None, "test-tool", "0.0.1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_history_replayed_to_late_joiner() {
        let (agent, events) = fake_agent(ServerState::Running);
        let addr = start_hub(HubConfig::default(), agent).await;

        // Let the serve task spin up its history recorder, then feed it
        // before anyone connects
        tokio::time::sleep(Duration::from_millis(200)).await;
        for i in 0..3 {
            events
                .send(AgentEvent::Log(LogEvent::now(
                    LogLevel::Info,
                    "boot",
                    format!("step {}", i),
                )))
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut client =
            BridgeClient::connect(&format!("ws://{}", addr), None, "test-tool", "0.0.1")
                .await
                .unwrap();

        for i in 0..3 {
            let event = tokio::time::timeout(Duration::from_secs(5), client.next_event())
                .await
                .unwrap()
                .unwrap();
            match event {
                BridgeEvent::Log(event) => assert_eq!(event.message, format!("step {}", i)),
                other => panic!("Expected log event, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_non_hello_first_message_is_rejected() {
        let (agent, _events) = fake_agent(ServerState::Running);
        let addr = start_hub(HubConfig::default(), agent).await;

        let (ws, _) = tokio_tungstenite::connect_async(format!(
            "ws://{}{}",
            addr,
            devbridge_protocol::WS_PATH
        ))
        .await
        .unwrap();
        let (mut sink, mut stream) = ws.split();

        // Skip the bridge hello
        let _ = stream.next().await.unwrap().unwrap();

        let request = serialize_client(&ClientMessage::GetCommands { request_id: 1 }).unwrap();
        sink.send(Message::Text(request.into())).await.unwrap();

        let reply = stream.next().await.unwrap().unwrap();
        let Message::Text(text) = reply else {
            panic!("Expected text frame, got {:?}", reply);
        };
        match deserialize_agent(text.as_str()).unwrap() {
            AgentMessage::Error { code, .. } => {
                assert_eq!(code, error_codes::HANDSHAKE_REQUIRED);
            }
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_version_mismatch_is_rejected() {
        let (agent, _events) = fake_agent(ServerState::Running);
        let addr = start_hub(HubConfig::default(), agent).await;

        let (ws, _) = tokio_tungstenite::connect_async(format!(
            "ws://{}{}",
            addr,
            devbridge_protocol::WS_PATH
        ))
        .await
        .unwrap();
        let (mut sink, mut stream) = ws.split();
        let _ = stream.next().await.unwrap().unwrap();

        let hello = serialize_client(&ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION + 1,
            client_name: "future-tool".into(),
            client_version: "9.9".into(),
        })
        .unwrap();
        sink.send(Message::Text(hello.into())).await.unwrap();

        let reply = stream.next().await.unwrap().unwrap();
        let Message::Text(text) = reply else {
            panic!("Expected text frame, got {:?}", reply);
        };
        match deserialize_agent(text.as_str()).unwrap() {
            AgentMessage::Error { code, .. } => {
                assert_eq!(code, error_codes::VERSION_MISMATCH);
            }
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_capacity_cap_rejects_excess_clients() {
        let (agent, _events) = fake_agent(ServerState::Running);
        let config = HubConfig {
            max_clients: 1,
            ..Default::default()
        };
        let addr = start_hub(config, agent).await;

        let first = BridgeClient::connect(&format!("ws://{}", addr), None, "tool-a", "0.0.1")
            .await
            .unwrap();
        // A completed request proves the first session is registered
        first.commands().await.unwrap();

        let err = BridgeClient::connect(&format!("ws://{}", addr), None, "tool-b", "0.0.1")
            .await
            .unwrap_err();
        assert!(
            err.to_string().contains("capacity"),
            "got: {}",
            err
        );
    }
}
