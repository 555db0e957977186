//! devbridge-tail binary
//!
//! Connects to a running bridge and streams the server log to the terminal.
//! Usage: devbridge-tail [ws://host:port]
//! The auth token, if the bridge requires one, comes from DEVBRIDGE_TOKEN.

use anyhow::Result;
use devbridge_client::{BridgeClient, BridgeEvent};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = std::env::args().collect();
    let addr = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("ws://127.0.0.1:24817");
    let token = std::env::var("DEVBRIDGE_TOKEN").ok();

    let mut client = BridgeClient::connect(
        addr,
        token.as_deref(),
        "devbridge-tail",
        env!("CARGO_PKG_VERSION"),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", addr, e))?;

    eprintln!(
        "connected to bridge v{} (server {})",
        client.hello().bridge_version,
        client.hello().server_state
    );

    while let Some(event) = client.next_event().await {
        match event {
            BridgeEvent::Log(event) => {
                println!(
                    "{} {:<5} {}: {}",
                    format_clock(event.timestamp_ms),
                    event.level.as_str(),
                    event.logger,
                    event.message
                );
                if let Some(throwable) = &event.throwable {
                    for line in throwable.lines() {
                        println!("        {}", line);
                    }
                }
            }
            BridgeEvent::State { state, exit_code } => match exit_code {
                Some(code) => println!("-- server {} (exit code {})", state, code),
                None => println!("-- server {}", state),
            },
        }
    }

    info!("Bridge closed the connection");
    Ok(())
}

/// UTC wall clock from an epoch-milliseconds timestamp
fn format_clock(timestamp_ms: u64) -> String {
    let secs = (timestamp_ms / 1000) % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
