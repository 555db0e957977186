//! Supervision of the game server process
//!
//! The supervisor owns the child process end to end: it spawns the server
//! with piped stdio, pumps stdout/stderr through the log parser into the
//! agent's broadcast channel, drives the lifecycle state machine, and
//! handles graceful shutdown (stop command, grace period, kill).

use crate::agent::AgentEvent;
use crate::config::ResolvedLaunch;
use crate::logparse::LogLineParser;
use devbridge_core::{BridgeError, LogLevel, Result, ServerState};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

/// Shared (state, exit code) snapshot read by the hub for hellos
pub(crate) type StateSnapshot = Arc<StdMutex<(ServerState, Option<i32>)>>;

/// Record a state transition and broadcast it
pub(crate) fn set_state(
    events: &broadcast::Sender<AgentEvent>,
    snapshot: &StateSnapshot,
    state: ServerState,
    exit_code: Option<i32>,
) {
    {
        let mut guard = snapshot.lock().expect("state snapshot poisoned");
        *guard = (state, exit_code);
    }
    info!("Server state: {}", state);
    // Ignore send errors (no subscribers)
    let _ = events.send(AgentEvent::State { state, exit_code });
}

/// Handle to a supervised server process
pub struct ServerProcess {
    stdin: Arc<Mutex<ChildStdin>>,
    events: broadcast::Sender<AgentEvent>,
    state: StateSnapshot,
    stop_requested: Arc<AtomicBool>,
    stop_command: String,
    stop_timeout: Duration,
    kill_tx: mpsc::Sender<()>,
    exited_rx: watch::Receiver<bool>,
}

impl ServerProcess {
    /// Spawn the server and start the supervision tasks
    pub fn spawn(
        launch: &ResolvedLaunch,
        events: broadcast::Sender<AgentEvent>,
        state: StateSnapshot,
    ) -> Result<Self> {
        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .envs(&launch.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &launch.working_dir {
            command.current_dir(dir);
        }

        info!("Launching server: {} {:?}", launch.program, launch.args);
        let mut child = command.spawn().map_err(|e| {
            BridgeError::Process(format!("Failed to spawn {}: {}", launch.program, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Process("Server stdin was not piped".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Process("Server stdout was not piped".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BridgeError::Process("Server stderr was not piped".into()))?;

        let stop_requested = Arc::new(AtomicBool::new(false));
        set_state(&events, &state, ServerState::Starting, None);

        tokio::spawn(pump_output(
            stdout,
            LogLineParser::new("stdout", LogLevel::Info),
            Some(launch.ready_pattern.clone()),
            events.clone(),
            state.clone(),
            stop_requested.clone(),
        ));
        tokio::spawn(pump_output(
            stderr,
            LogLineParser::new("stderr", LogLevel::Error),
            None,
            events.clone(),
            state.clone(),
            stop_requested.clone(),
        ));

        let (kill_tx, kill_rx) = mpsc::channel(1);
        let (exited_tx, exited_rx) = watch::channel(false);
        tokio::spawn(wait_for_exit(
            child,
            kill_rx,
            exited_tx,
            events.clone(),
            state.clone(),
            stop_requested.clone(),
        ));

        Ok(Self {
            stdin: Arc::new(Mutex::new(stdin)),
            events,
            state,
            stop_requested,
            stop_command: launch.stop_command.clone(),
            stop_timeout: launch.stop_timeout,
            kill_tx,
            exited_rx,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        self.state.lock().expect("state snapshot poisoned").0
    }

    /// Write one console command to the server's stdin
    pub async fn send_command(&self, line: &str) -> Result<()> {
        let current = self.state();
        if !current.accepts_commands() {
            return Err(BridgeError::CommandFailed(format!(
                "Server is {}",
                current
            )));
        }
        self.write_line(line).await
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        write
            .await
            .map_err(|e| BridgeError::CommandFailed(format!("Console write failed: {}", e)))
    }

    /// Request a clean shutdown, escalating to kill after the grace period
    pub async fn stop(&self) {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.state().is_terminal() {
            return;
        }

        set_state(&self.events, &self.state, ServerState::Stopping, None);
        debug!("Sending stop command: {}", self.stop_command);
        let stop_command = self.stop_command.clone();
        if let Err(e) = self.write_line(&stop_command).await {
            warn!("Failed to send stop command: {}", e);
        }

        let mut exited = self.exited_rx.clone();
        let deadline = tokio::time::timeout(self.stop_timeout, exited.wait_for(|done| *done));
        if deadline.await.is_err() {
            warn!(
                "Server did not exit within {:?}, killing",
                self.stop_timeout
            );
            let _ = self.kill_tx.try_send(());
            let _ = exited.wait_for(|done| *done).await;
        }
    }
}

/// Pump one output stream through the parser into the event channel
async fn pump_output<R: AsyncRead + Unpin + Send + 'static>(
    reader: R,
    mut parser: LogLineParser,
    ready_pattern: Option<String>,
    events: broadcast::Sender<AgentEvent>,
    state: StateSnapshot,
    stop_requested: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(reader).lines();
    let mut ready = false;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(pattern) = &ready_pattern {
                    if !ready
                        && line.contains(pattern.as_str())
                        && !stop_requested.load(Ordering::SeqCst)
                    {
                        ready = true;
                        set_state(&events, &state, ServerState::Running, None);
                    }
                }
                if let Some(event) = parser.push_line(&line) {
                    let _ = events.send(AgentEvent::Log(event));
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read server {}: {}", parser.stream(), e);
                break;
            }
        }
    }

    if let Some(event) = parser.flush() {
        let _ = events.send(AgentEvent::Log(event));
    }
    debug!("Server {} stream closed", parser.stream());
}

/// Wait for the child to exit (or a kill request) and emit the final state
async fn wait_for_exit(
    mut child: Child,
    mut kill_rx: mpsc::Receiver<()>,
    exited_tx: watch::Sender<bool>,
    events: broadcast::Sender<AgentEvent>,
    state: StateSnapshot,
    stop_requested: Arc<AtomicBool>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx.recv() => {
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill server process: {}", e);
            }
            child.wait().await
        }
    };

    let (final_state, exit_code) = match status {
        Ok(status) => {
            let code = status.code();
            if stop_requested.load(Ordering::SeqCst) || status.success() {
                (ServerState::Stopped, code)
            } else {
                (ServerState::Crashed, code)
            }
        }
        Err(e) => {
            error!("Failed to wait for server process: {}", e);
            (ServerState::Crashed, None)
        }
    };

    set_state(&events, &state, final_state, exit_code);
    let _ = exited_tx.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn shell_launch(script: &str, ready_pattern: &str) -> ResolvedLaunch {
        ResolvedLaunch {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: None,
            env: HashMap::new(),
            ready_pattern: ready_pattern.to_string(),
            stop_command: "stop".to_string(),
            stop_timeout: Duration::from_secs(1),
            assets_redirected: false,
        }
    }

    async fn collect_until_terminal(
        rx: &mut broadcast::Receiver<AgentEvent>,
    ) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for events")
                .expect("event channel closed");
            let terminal = matches!(
                event,
                AgentEvent::State { state, .. } if state.is_terminal()
            );
            events.push(event);
            if terminal {
                break;
            }
        }
        // Log flushes from the pump tasks can race the exit event
        while let Ok(Ok(event)) =
            tokio::time::timeout(Duration::from_millis(500), rx.recv()).await
        {
            events.push(event);
        }
        events
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_lifecycle_of_clean_exit() {
        let (events, mut rx) = broadcast::channel(64);
        let state: StateSnapshot = Arc::new(StdMutex::new((ServerState::Detached, None)));

        let launch = shell_launch("echo '[INFO] boot'; echo 'Server started'; echo done", "Server started");
        let process = ServerProcess::spawn(&launch, events, state).unwrap();

        let seen = collect_until_terminal(&mut rx).await;

        let states: Vec<ServerState> = seen
            .iter()
            .filter_map(|e| match e {
                AgentEvent::State { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert!(states.contains(&ServerState::Starting));
        assert!(states.contains(&ServerState::Running));
        assert_eq!(*states.last().unwrap(), ServerState::Stopped);

        // "done" only flushes when the stream closes, which races the exit
        // event, so assert on the records completed while the process lived
        let messages: Vec<&str> = seen
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Log(event) => Some(event.message.as_str()),
                _ => None,
            })
            .collect();
        assert!(messages.contains(&"boot"));
        assert!(messages.contains(&"Server started"));
        assert!(process.state().is_terminal());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unrequested_failure_is_a_crash() {
        let (events, mut rx) = broadcast::channel(64);
        let state: StateSnapshot = Arc::new(StdMutex::new((ServerState::Detached, None)));

        let launch = shell_launch("exit 3", "Server started");
        let _process = ServerProcess::spawn(&launch, events, state).unwrap();

        let seen = collect_until_terminal(&mut rx).await;
        match seen.last().unwrap() {
            AgentEvent::State { state, exit_code } => {
                assert_eq!(*state, ServerState::Crashed);
                assert_eq!(*exit_code, Some(3));
            }
            other => panic!("Expected state event, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_kills_an_unresponsive_server() {
        let (events, mut rx) = broadcast::channel(64);
        let state: StateSnapshot = Arc::new(StdMutex::new((ServerState::Detached, None)));

        // Ignores the stop command and sleeps well past the grace period
        let launch = shell_launch("echo 'Server started'; sleep 30", "Server started");
        let process = ServerProcess::spawn(&launch, events, state).unwrap();

        // Wait until running, then stop
        loop {
            match tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap()
            {
                AgentEvent::State { state: ServerState::Running, .. } => break,
                _ => continue,
            }
        }

        process.stop().await;
        assert!(process.state().is_terminal());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_command_rejected_after_exit() {
        let (events, mut rx) = broadcast::channel(64);
        let state: StateSnapshot = Arc::new(StdMutex::new((ServerState::Detached, None)));

        let launch = shell_launch("true", "Server started");
        let process = ServerProcess::spawn(&launch, events, state).unwrap();
        collect_until_terminal(&mut rx).await;

        let err = process.send_command("help").await.unwrap_err();
        assert!(matches!(err, BridgeError::CommandFailed(_)));
    }
}
