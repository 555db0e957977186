//! Ring buffer of recent log events, replayed to newly connected clients

use devbridge_agent::AgentEvent;
use devbridge_core::LogEvent;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Bounded buffer of the most recent log events
pub struct LogHistory {
    events: VecDeque<LogEvent>,
    capacity: usize,
}

impl LogHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, evicting the oldest when full
    pub fn push(&mut self, event: LogEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Oldest-first snapshot for replay
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Record log events from the agent stream into the shared history
pub async fn record(
    history: Arc<Mutex<LogHistory>>,
    mut events: broadcast::Receiver<AgentEvent>,
) {
    loop {
        match events.recv().await {
            Ok(AgentEvent::Log(event)) => {
                history.lock().await.push(event);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Log history recorder lagged, missed {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Agent event channel closed, history recorder exiting");
                break;
            }
        }
    }
}
