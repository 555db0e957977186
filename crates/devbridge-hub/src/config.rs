//! Hub configuration

use std::time::Duration;
use tracing::warn;

/// Environment variable for the listen port
pub const PORT_ENV: &str = "DEVBRIDGE_PORT";

/// Environment variable for the shared auth token
pub const TOKEN_ENV: &str = "DEVBRIDGE_TOKEN";

/// Environment variable for the bind address
pub const BIND_ENV: &str = "DEVBRIDGE_BIND";

/// Configuration for the WebSocket endpoint
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Address to bind (default: loopback only)
    pub bind: String,
    /// Listen port
    pub port: u16,
    /// Bearer token clients must present; None disables auth
    pub token: Option<String>,
    /// Number of log events replayed to newly connected clients
    pub log_history: usize,
    /// Maximum concurrently connected clients
    pub max_clients: usize,
    /// How long a client gets to complete the hello
    pub handshake_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 24817,
            token: None,
            log_history: 512,
            max_clients: 8,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl HubConfig {
    /// Build from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.bind = bind;
        }
        if let Ok(port) = std::env::var(PORT_ENV) {
            match port.parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!("Ignoring invalid {}: {}", PORT_ENV, port),
            }
        }
        config.token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());

        config
    }

    /// Socket address string for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_loopback() {
        let config = HubConfig::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:24817");
        assert!(config.token.is_none());
        assert_eq!(config.max_clients, 8);
    }
}
