//! devbridge server binary
//!
//! Launches the game server under agent supervision (when an installation
//! can be found) and hosts the WebSocket endpoint development tools connect
//! to. With no installation present the bridge runs detached so tools can
//! still connect.

use anyhow::Result;
use devbridge_agent::{AgentHandle, DevAgent, LaunchConfig, install};
use devbridge_hub::{BridgeHub, HubConfig};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let hub_config = HubConfig::from_env();
    let launch_config = LaunchConfig::load()?;

    let (agent_handle, _agent_task) = match launch_config.resolve() {
        Ok(launch) => {
            let (agent, handle) = DevAgent::attach(launch)
                .map_err(|e| anyhow::anyhow!("Failed to attach to server: {}", e))?;
            info!("Agent attached, supervising server process");
            (handle, Some(tokio::spawn(agent.run())))
        }
        Err(e) => {
            warn!("{}", e);
            warn!("{}", install::missing_install_warning());
            (AgentHandle::detached(), None)
        }
    };

    let hub = BridgeHub::new(hub_config, agent_handle.clone());

    tokio::select! {
        result = hub.run() => {
            result.map_err(|e| anyhow::anyhow!("Hub error: {}", e))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            agent_handle.stop().await;
        }
    }

    Ok(())
}
