//! Agent facade and the in-process channel contract used by the hub
//!
//! The hub never touches the server process directly. It holds an
//! [`AgentHandle`]: a broadcast channel of [`AgentEvent`]s for the push
//! stream and an mpsc channel of [`AgentRequest`]s, each answered over a
//! oneshot.

use crate::commands::CommandRegistry;
use crate::config::ResolvedLaunch;
use crate::process::{ServerProcess, StateSnapshot};
use devbridge_core::{BridgeError, Capability, LogEvent, Result, ServerState, error_codes};
use devbridge_protocol::{AgentMessage, ClientMessage};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

/// Capacity of the agent event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// Pushed event from the agent
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// One server log record
    Log(LogEvent),
    /// Server lifecycle transition
    State {
        state: ServerState,
        exit_code: Option<i32>,
    },
}

/// One client request routed to the agent, answered over the oneshot
pub struct AgentRequest {
    pub message: ClientMessage,
    pub reply: oneshot::Sender<Result<AgentMessage>>,
}

/// Cloneable view of the agent handed to the hub
#[derive(Clone)]
pub struct AgentHandle {
    events: broadcast::Sender<AgentEvent>,
    requests: mpsc::Sender<AgentRequest>,
    capabilities: Vec<Capability>,
    state: StateSnapshot,
    process: Option<Arc<ServerProcess>>,
}

impl AgentHandle {
    /// Build a handle around externally-served channels. Used for agent
    /// implementations that do not supervise a process (and for tests).
    pub fn new(
        events: broadcast::Sender<AgentEvent>,
        requests: mpsc::Sender<AgentRequest>,
        capabilities: Vec<Capability>,
        initial_state: ServerState,
    ) -> Self {
        Self {
            events,
            requests,
            capabilities,
            state: Arc::new(StdMutex::new((initial_state, None))),
            process: None,
        }
    }

    /// Handle for a bridge with no server under control: events never fire
    /// and every request is answered with an AgentUnavailable error.
    pub fn detached() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (request_tx, mut request_rx) = mpsc::channel::<AgentRequest>(REQUEST_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(AgentRequest { message, reply }) = request_rx.recv().await {
                let response = match message.request_id() {
                    Some(request_id) => Ok(AgentMessage::Error {
                        request_id: Some(request_id),
                        code: error_codes::AGENT_UNAVAILABLE,
                        message: "No server process is under agent control".into(),
                    }),
                    None => Err(BridgeError::AgentUnavailable),
                };
                let _ = reply.send(response);
            }
        });

        Self::new(events, request_tx, Vec::new(), ServerState::Detached)
    }

    /// Subscribe to the push event stream
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// The event sender; exposed so recorders can subscribe independently
    pub fn events(&self) -> &broadcast::Sender<AgentEvent> {
        &self.events
    }

    /// Capabilities advertised in the hello
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Current server lifecycle state
    pub fn server_state(&self) -> ServerState {
        self.state.lock().expect("state snapshot poisoned").0
    }

    /// Route one request to the agent and await its response
    pub async fn request(&self, message: ClientMessage) -> Result<AgentMessage> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(AgentRequest {
                message,
                reply: reply_tx,
            })
            .await
            .map_err(|_| BridgeError::AgentUnavailable)?;
        reply_rx.await.map_err(|_| BridgeError::AgentUnavailable)?
    }

    /// Gracefully stop the supervised server, if there is one
    pub async fn stop(&self) {
        if let Some(process) = &self.process {
            process.stop().await;
        }
    }
}

/// The agent: owns the supervised process and the command registry, serves
/// the request channel
pub struct DevAgent {
    process: Arc<ServerProcess>,
    registry: CommandRegistry,
    events_rx: broadcast::Receiver<AgentEvent>,
    request_rx: mpsc::Receiver<AgentRequest>,
}

impl DevAgent {
    /// Spawn the server and return the agent plus the hub-facing handle
    pub fn attach(launch: ResolvedLaunch) -> Result<(DevAgent, AgentHandle)> {
        let (events, events_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let state: StateSnapshot = Arc::new(StdMutex::new((ServerState::Detached, None)));

        let mut capabilities = vec![Capability::Logs, Capability::Commands];
        if launch.assets_redirected {
            capabilities.push(Capability::Assets);
        }

        // Subscribe before the spawn so no state transition is missed
        let process = Arc::new(ServerProcess::spawn(&launch, events.clone(), state.clone())?);

        let handle = AgentHandle {
            events,
            requests: request_tx,
            capabilities,
            state,
            process: Some(process.clone()),
        };
        let agent = DevAgent {
            process,
            registry: CommandRegistry::new(),
            events_rx,
            request_rx,
        };
        Ok((agent, handle))
    }

    /// Serve events and requests until the bridge shuts down
    pub async fn run(self) {
        let DevAgent {
            process,
            mut registry,
            mut events_rx,
            mut request_rx,
        } = self;

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Ok(AgentEvent::State { state: ServerState::Running, .. }) => {
                        // The registry is scavenged from the server's own
                        // help output once it is up
                        registry.begin_collection();
                        if let Err(e) = process.send_command("help").await {
                            warn!("Failed to request command registry: {}", e);
                        }
                    }
                    Ok(AgentEvent::Log(event)) => {
                        if registry.is_collecting() {
                            registry.ingest(&event.message);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Agent event loop lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                request = request_rx.recv() => match request {
                    Some(AgentRequest { message, reply }) => {
                        let response = handle_request(&process, &registry, message).await;
                        let _ = reply.send(response);
                    }
                    None => {
                        debug!("Request channel closed, agent loop exiting");
                        break;
                    }
                },
            }
        }
    }
}

async fn handle_request(
    process: &ServerProcess,
    registry: &CommandRegistry,
    message: ClientMessage,
) -> Result<AgentMessage> {
    match message {
        ClientMessage::GetCommands { request_id } => Ok(AgentMessage::Commands {
            request_id,
            commands: registry.commands(),
        }),
        ClientMessage::GetSuggestions {
            request_id,
            input,
            cursor,
        } => Ok(AgentMessage::Suggestions {
            request_id,
            suggestions: registry.suggest(&input, cursor),
        }),
        ClientMessage::ExecuteCommand {
            request_id,
            command,
        } => match process.send_command(&command).await {
            Ok(()) => Ok(AgentMessage::CommandAccepted { request_id }),
            Err(e) => Ok(AgentMessage::Error {
                request_id: Some(request_id),
                code: error_codes::COMMAND_FAILED,
                message: e.to_string(),
            }),
        },
        ClientMessage::Hello { .. } => {
            Err(BridgeError::Protocol("Unexpected hello from session".into()))
        }
    }
}
