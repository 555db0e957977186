//! Per-client session task
//!
//! Lifecycle: bridge hello -> client hello (with timeout and version check)
//! -> registry admission -> log history replay -> live loop forwarding agent
//! events and routing requests.

use crate::history::LogHistory;
use crate::registry::{ClientId, ClientRegistry};
use devbridge_agent::{AgentEvent, AgentHandle};
use devbridge_core::error_codes;
use devbridge_protocol::{
    AgentMessage, BRIDGE_VERSION, ClientMessage, PROTOCOL_VERSION, deserialize_client,
    serialize_agent,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Serve one authenticated WebSocket connection to completion
pub(crate) async fn run_session(
    ws: WebSocketStream<TcpStream>,
    agent: AgentHandle,
    registry: Arc<Mutex<ClientRegistry>>,
    history: Arc<Mutex<LogHistory>>,
    handshake_timeout: Duration,
) {
    let (mut sink, mut stream) = ws.split();

    // Reject before doing any work when the bridge is full; a racing
    // admission can still fail at registration below
    if registry.lock().await.available_slots() == 0 {
        debug!("Rejecting connection: no client slots available");
        let _ = send_message(
            &mut sink,
            &AgentMessage::Error {
                request_id: None,
                code: error_codes::CAPACITY_EXCEEDED,
                message: "Maximum client capacity exceeded".into(),
            },
        )
        .await;
        let _ = sink.close().await;
        return;
    }

    let hello = AgentMessage::Hello {
        protocol_version: PROTOCOL_VERSION,
        bridge_version: BRIDGE_VERSION.to_string(),
        capabilities: agent.capabilities().to_vec(),
        server_state: agent.server_state(),
    };
    if !send_message(&mut sink, &hello).await {
        return;
    }

    let (client_name, client_version) =
        match handshake(&mut sink, &mut stream, handshake_timeout).await {
            Some(identity) => identity,
            None => return,
        };

    let client_id = match registry.lock().await.register(&client_name, &client_version) {
        Ok(client_id) => client_id,
        Err(e) => {
            debug!("Rejecting client {}: {}", client_name, e);
            let _ = send_message(
                &mut sink,
                &AgentMessage::Error {
                    request_id: None,
                    code: error_codes::CAPACITY_EXCEEDED,
                    message: e.to_string(),
                },
            )
            .await;
            let _ = sink.close().await;
            return;
        }
    };
    info!(
        "Client connected: {} v{} (id {})",
        client_name, client_version, client_id
    );

    // Replay recent history so late joiners see how the server got here
    let past = history.lock().await.snapshot();
    let replayed = past.len();
    for event in past {
        if !send_message(&mut sink, &AgentMessage::Log { event }).await {
            registry.lock().await.deregister(client_id).ok();
            return;
        }
    }
    debug!("Replayed {} log events to client {}", replayed, client_id);

    let mut events = agent.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(AgentEvent::Log(event)) => {
                    if !send_message(&mut sink, &AgentMessage::Log { event }).await {
                        break;
                    }
                }
                Ok(AgentEvent::State { state, exit_code }) => {
                    if !send_message(&mut sink, &AgentMessage::State { state, exit_code }).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Client {} lagging, missed {} events", client_id, n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => match deserialize_client(text.as_str()) {
                    Ok(message) => {
                        if !handle_client_message(&mut sink, &agent, client_id, message).await {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Malformed message from client {}: {}", client_id, e);
                        let error = AgentMessage::Error {
                            request_id: None,
                            code: error_codes::BAD_REQUEST,
                            message: format!("Malformed message: {}", e),
                        };
                        if !send_message(&mut sink, &error).await {
                            break;
                        }
                    }
                },
                Some(Ok(Message::Close(_))) => {
                    debug!("Client {} closed the connection", client_id);
                    break;
                }
                Some(Ok(_)) => {} // ping/pong handled by the library, binary ignored
                Some(Err(e)) => {
                    debug!("WebSocket error for client {}: {}", client_id, e);
                    break;
                }
                None => break,
            },
        }
    }

    registry.lock().await.deregister(client_id).ok();
    info!("Client disconnected: {} (id {})", client_name, client_id);
}

/// Await the client hello. Returns None after reporting the failure.
async fn handshake(
    sink: &mut WsSink,
    stream: &mut WsStream,
    timeout: Duration,
) -> Option<(String, String)> {
    let first = match tokio::time::timeout(timeout, read_first_message(stream)).await {
        Ok(first) => first,
        Err(_) => {
            let _ = send_message(
                sink,
                &AgentMessage::Error {
                    request_id: None,
                    code: error_codes::HANDSHAKE_REQUIRED,
                    message: "Handshake timed out".into(),
                },
            )
            .await;
            let _ = sink.close().await;
            return None;
        }
    };

    match first {
        FirstMessage::Valid(ClientMessage::Hello {
            protocol_version,
            client_name,
            client_version,
        }) => {
            if protocol_version != PROTOCOL_VERSION {
                let _ = send_message(
                    sink,
                    &AgentMessage::Error {
                        request_id: None,
                        code: error_codes::VERSION_MISMATCH,
                        message: format!(
                            "Bridge speaks protocol {}, client sent {}",
                            PROTOCOL_VERSION, protocol_version
                        ),
                    },
                )
                .await;
                let _ = sink.close().await;
                return None;
            }
            Some((client_name, client_version))
        }
        FirstMessage::Valid(_) | FirstMessage::Invalid => {
            let _ = send_message(
                sink,
                &AgentMessage::Error {
                    request_id: None,
                    code: error_codes::HANDSHAKE_REQUIRED,
                    message: "Hello must be the first message".into(),
                },
            )
            .await;
            let _ = sink.close().await;
            None
        }
        FirstMessage::Closed => None,
    }
}

enum FirstMessage {
    Valid(ClientMessage),
    Invalid,
    Closed,
}

async fn read_first_message(stream: &mut WsStream) -> FirstMessage {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                return deserialize_client(text.as_str())
                    .map(FirstMessage::Valid)
                    .unwrap_or(FirstMessage::Invalid);
            }
            Ok(Message::Close(_)) | Err(_) => return FirstMessage::Closed,
            Ok(_) => {}
        }
    }
    FirstMessage::Closed
}

/// Route one post-handshake client message. Returns false when the
/// connection is no longer usable.
async fn handle_client_message(
    sink: &mut WsSink,
    agent: &AgentHandle,
    client_id: ClientId,
    message: ClientMessage,
) -> bool {
    if matches!(message, ClientMessage::Hello { .. }) {
        let error = AgentMessage::Error {
            request_id: None,
            code: error_codes::BAD_REQUEST,
            message: "Duplicate hello".into(),
        };
        return send_message(sink, &error).await;
    }

    let request_id = message.request_id();
    debug!("Request {:?} from client {}", request_id, client_id);

    let response = match agent.request(message).await {
        Ok(response) => response,
        Err(e) => AgentMessage::Error {
            request_id,
            code: error_codes::AGENT_UNAVAILABLE,
            message: e.to_string(),
        },
    };
    send_message(sink, &response).await
}

/// Send one message; false means the connection is gone
async fn send_message(sink: &mut WsSink, msg: &AgentMessage) -> bool {
    match serialize_agent(msg) {
        Ok(json) => sink.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            // Serialization of our own types failing is a bug, not a
            // connection problem
            warn!("Failed to serialize message: {}", e);
            true
        }
    }
}
