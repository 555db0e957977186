//! # devbridge-client
//!
//! Typed client for the devbridge WebSocket protocol. Development tools use
//! [`BridgeClient`] to stream server logs and lifecycle events and to drive
//! the console command surface (registry, completions, execution).
//!
//! Requests are pipelined: each call allocates a request id, parks a oneshot
//! under it, and the reader task routes the matching response back.

use devbridge_core::{
    BridgeError, Capability, CommandInfo, LogEvent, Result, ServerState, Suggestion, error_codes,
};
use devbridge_protocol::{
    AgentMessage, ClientMessage, PROTOCOL_VERSION, WS_PATH, deserialize_agent, serialize_client,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<AgentMessage>>>>>;

/// Pushed event from the bridge
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// One server log record
    Log(LogEvent),
    /// Server lifecycle transition
    State {
        state: ServerState,
        exit_code: Option<i32>,
    },
}

/// What the bridge said in its hello
#[derive(Debug, Clone)]
pub struct BridgeHello {
    pub bridge_version: String,
    pub capabilities: Vec<Capability>,
    pub server_state: ServerState,
}

/// Connected client for the devbridge protocol
#[derive(Debug)]
pub struct BridgeClient {
    hello: BridgeHello,
    writer_tx: mpsc::Sender<Message>,
    events_rx: mpsc::Receiver<BridgeEvent>,
    pending: Pending,
    next_request_id: AtomicU64,
}

impl BridgeClient {
    /// Connect to a bridge at `addr` (e.g. `ws://127.0.0.1:24817`) and run
    /// the hello exchange
    pub async fn connect(
        addr: &str,
        token: Option<&str>,
        client_name: &str,
        client_version: &str,
    ) -> Result<Self> {
        let url = format!("{}{}", addr.trim_end_matches('/'), WS_PATH);
        debug!("Connecting to {}", url);

        let mut request = url
            .into_client_request()
            .map_err(|e| BridgeError::Config(format!("Invalid bridge address: {}", e)))?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| BridgeError::Config(format!("Invalid token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let hello = read_bridge_hello(&mut stream).await?;

        let client_hello = ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            client_name: client_name.to_string(),
            client_version: client_version.to_string(),
        };
        send_now(&mut sink, &client_hello).await?;

        let (writer_tx, writer_rx) = mpsc::channel::<Message>(32);
        tokio::spawn(write_loop(sink, writer_rx));

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::channel(128);
        tokio::spawn(read_loop(stream, pending.clone(), events_tx));

        Ok(Self {
            hello,
            writer_tx,
            events_rx,
            pending,
            next_request_id: AtomicU64::new(1),
        })
    }

    /// What the bridge reported during the handshake
    pub fn hello(&self) -> &BridgeHello {
        &self.hello
    }

    /// Next pushed event; None once the connection is gone
    pub async fn next_event(&mut self) -> Option<BridgeEvent> {
        self.events_rx.recv().await
    }

    /// Fetch the server's console command registry
    pub async fn commands(&self) -> Result<Vec<CommandInfo>> {
        let request_id = self.next_request_id();
        let response = self
            .request(request_id, &ClientMessage::GetCommands { request_id })
            .await?;
        match response {
            AgentMessage::Commands { commands, .. } => Ok(commands),
            other => Err(unexpected(other)),
        }
    }

    /// Fetch completions for a console input
    pub async fn suggest(&self, input: &str, cursor: usize) -> Result<Vec<Suggestion>> {
        let request_id = self.next_request_id();
        let response = self
            .request(
                request_id,
                &ClientMessage::GetSuggestions {
                    request_id,
                    input: input.to_string(),
                    cursor,
                },
            )
            .await?;
        match response {
            AgentMessage::Suggestions { suggestions, .. } => Ok(suggestions),
            other => Err(unexpected(other)),
        }
    }

    /// Execute a console command on the server. Success means the command
    /// reached the server console; output arrives in the log stream.
    pub async fn execute(&self, command: &str) -> Result<()> {
        let request_id = self.next_request_id();
        let response = self
            .request(
                request_id,
                &ClientMessage::ExecuteCommand {
                    request_id,
                    command: command.to_string(),
                },
            )
            .await?;
        match response {
            AgentMessage::CommandAccepted { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn request(&self, request_id: u64, message: &ClientMessage) -> Result<AgentMessage> {
        let json = serialize_client(message)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(request_id, reply_tx);

        if self.writer_tx.send(Message::Text(json.into())).await.is_err() {
            self.pending
                .lock()
                .expect("pending map poisoned")
                .remove(&request_id);
            return Err(BridgeError::Transport("Connection closed".into()));
        }

        reply_rx
            .await
            .map_err(|_| BridgeError::Transport("Connection closed".into()))?
    }
}

/// Await the bridge hello that opens every connection
async fn read_bridge_hello(stream: &mut WsStream) -> Result<BridgeHello> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match deserialize_agent(text.as_str())? {
                AgentMessage::Hello {
                    protocol_version,
                    bridge_version,
                    capabilities,
                    server_state,
                } => {
                    if protocol_version != PROTOCOL_VERSION {
                        return Err(BridgeError::Handshake(format!(
                            "Bridge speaks protocol {}, this client speaks {}",
                            protocol_version, PROTOCOL_VERSION
                        )));
                    }
                    return Ok(BridgeHello {
                        bridge_version,
                        capabilities,
                        server_state,
                    });
                }
                AgentMessage::Error { message, .. } => {
                    return Err(BridgeError::Handshake(format!(
                        "Bridge rejected connection: {}",
                        message
                    )));
                }
                other => {
                    return Err(BridgeError::Handshake(format!(
                        "Expected hello, got {:?}",
                        other
                    )));
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(other)) => {
                return Err(BridgeError::Handshake(format!(
                    "Expected hello, got {:?}",
                    other
                )));
            }
            Some(Err(e)) => return Err(BridgeError::Transport(e.to_string())),
            None => {
                return Err(BridgeError::Transport(
                    "Connection closed during handshake".into(),
                ));
            }
        }
    }
}

async fn send_now(sink: &mut WsSink, message: &ClientMessage) -> Result<()> {
    let json = serialize_client(message)?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| BridgeError::Transport(e.to_string()))
}

async fn write_loop(mut sink: WsSink, mut writer_rx: mpsc::Receiver<Message>) {
    while let Some(message) = writer_rx.recv().await {
        if let Err(e) = sink.send(message).await {
            debug!("Write failed, stopping writer: {}", e);
            break;
        }
    }
}

async fn read_loop(mut stream: WsStream, pending: Pending, events_tx: mpsc::Sender<BridgeEvent>) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match deserialize_agent(text.as_str()) {
                Ok(message) => route_message(&pending, &events_tx, message).await,
                Err(e) => debug!("Ignoring malformed message: {}", e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket error: {}", e);
                break;
            }
        }
    }

    // Connection gone: fail every in-flight request, end the event stream
    let mut pending = pending.lock().expect("pending map poisoned");
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(BridgeError::Transport("Connection closed".into())));
    }
}

async fn route_message(pending: &Pending, events_tx: &mpsc::Sender<BridgeEvent>, message: AgentMessage) {
    if let Some(request_id) = message.request_id() {
        let reply = pending
            .lock()
            .expect("pending map poisoned")
            .remove(&request_id);
        match reply {
            Some(reply) => {
                let response = match message {
                    AgentMessage::Error { code, message, .. } => Err(error_from(code, message)),
                    other => Ok(other),
                };
                let _ = reply.send(response);
            }
            None => debug!("Response for unknown request {}", request_id),
        }
        return;
    }

    let event = match message {
        AgentMessage::Log { event } => BridgeEvent::Log(event),
        AgentMessage::State { state, exit_code } => BridgeEvent::State { state, exit_code },
        AgentMessage::Error { code, message, .. } => {
            warn!("Bridge error {}: {}", code, message);
            return;
        }
        _ => return,
    };
    let _ = events_tx.send(event).await;
}

/// Map a wire error onto the client-side error type
fn error_from(code: i32, message: String) -> BridgeError {
    match code {
        error_codes::AGENT_UNAVAILABLE => BridgeError::AgentUnavailable,
        error_codes::COMMAND_FAILED => BridgeError::CommandFailed(message),
        error_codes::VERSION_MISMATCH => BridgeError::Handshake(message),
        _ => BridgeError::Protocol(format!("Bridge error {}: {}", code, message)),
    }
}

fn unexpected(message: AgentMessage) -> BridgeError {
    BridgeError::Protocol(format!("Unexpected response: {:?}", message))
}
