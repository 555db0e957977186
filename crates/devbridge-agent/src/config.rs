//! Launch configuration for the supervised server process
//!
//! Configuration is read from a JSON file named by the
//! `DEVBRIDGE_AGENT_CONFIG` environment variable; every field has a default
//! so the file is optional.

use crate::install;
use devbridge_core::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the launch configuration file
pub const AGENT_CONFIG_ENV: &str = "DEVBRIDGE_AGENT_CONFIG";

/// One asset path redirect applied to the server launch arguments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct AssetRedirect {
    /// Path the server would normally be given
    pub source: PathBuf,
    /// Path to substitute during development
    pub target: PathBuf,
}

/// How to launch and manage the server process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchConfig {
    /// JVM binary used to run the server jar
    #[serde(default = "default_java_binary")]
    pub java_binary: String,

    /// Server jar; discovered via the installation finder when unset
    #[serde(default)]
    pub server_jar: Option<PathBuf>,

    /// Extra arguments appended after the jar
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the server process
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables for the server process
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Asset path redirects applied to the launch arguments
    #[serde(default)]
    pub asset_redirects: Vec<AssetRedirect>,

    /// Substring of a log line that marks the server as serving
    #[serde(default = "default_ready_pattern")]
    pub ready_pattern: String,

    /// Console command that requests a clean shutdown
    #[serde(default = "default_stop_command")]
    pub stop_command: String,

    /// Seconds to wait after the stop command before killing the process
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_java_binary() -> String {
    "java".to_string()
}

fn default_ready_pattern() -> String {
    "Server started".to_string()
}

fn default_stop_command() -> String {
    "stop".to_string()
}

fn default_stop_timeout_secs() -> u64 {
    10
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            java_binary: default_java_binary(),
            server_jar: None,
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            asset_redirects: Vec::new(),
            ready_pattern: default_ready_pattern(),
            stop_command: default_stop_command(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

impl LaunchConfig {
    /// Load from the file named by `DEVBRIDGE_AGENT_CONFIG`, or defaults
    /// when the variable is unset
    pub fn load() -> Result<Self> {
        match std::env::var_os(AGENT_CONFIG_ENV) {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    BridgeError::Config(format!(
                        "Failed to read agent configuration {:?}: {}",
                        path, e
                    ))
                })?;
                serde_json::from_str(&text).map_err(|e| {
                    BridgeError::Config(format!("Invalid agent configuration: {}", e))
                })
            }
            None => Ok(Self::default()),
        }
    }

    /// Stop grace period as a [`Duration`]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Resolve into a concrete launch command, discovering the server jar
    /// when the config does not pin one. Errors when no server can be found;
    /// callers fall back to detached mode.
    pub fn resolve(&self) -> Result<ResolvedLaunch> {
        let jar = match &self.server_jar {
            Some(jar) if jar.is_file() => jar.clone(),
            Some(jar) => {
                return Err(BridgeError::Install(format!(
                    "Configured server jar does not exist: {}",
                    jar.display()
                )));
            }
            None => install::find_server_jar()
                .ok_or_else(|| BridgeError::Install("No server installation found".into()))?,
        };

        let mut args = vec!["-jar".to_string(), jar.display().to_string()];
        args.extend(self.args.iter().cloned());
        let args = crate::assets::apply_redirects(&args, &self.asset_redirects);

        Ok(ResolvedLaunch {
            program: self.java_binary.clone(),
            args,
            working_dir: self.working_dir.clone(),
            env: self.env.clone(),
            ready_pattern: self.ready_pattern.clone(),
            stop_command: self.stop_command.clone(),
            stop_timeout: self.stop_timeout(),
            assets_redirected: !self.asset_redirects.is_empty(),
        })
    }
}

/// Fully resolved launch command handed to the process supervisor
#[derive(Debug, Clone)]
pub struct ResolvedLaunch {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub ready_pattern: String,
    pub stop_command: String,
    pub stop_timeout: Duration,
    /// Whether any asset redirect was applied (drives the Assets capability)
    pub assets_redirected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LaunchConfig::default();
        assert_eq!(config.java_binary, "java");
        assert_eq!(config.stop_command, "stop");
        assert_eq!(config.stop_timeout(), Duration::from_secs(10));
        assert!(config.asset_redirects.is_empty());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let json = r#"{"ReadyPattern":"Listening on","Args":["--nogui"]}"#;
        let config: LaunchConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.ready_pattern, "Listening on");
        assert_eq!(config.args, vec!["--nogui"]);
        assert_eq!(config.java_binary, "java");
        assert_eq!(config.stop_timeout_secs, 10);
    }

    #[test]
    fn test_resolve_rejects_missing_pinned_jar() {
        let config = LaunchConfig {
            server_jar: Some(PathBuf::from("/no/such/Server.jar")),
            ..Default::default()
        };
        let err = config.resolve().unwrap_err();
        assert!(matches!(err, BridgeError::Install(_)));
    }
}
