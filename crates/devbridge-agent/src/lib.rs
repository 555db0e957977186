//! # devbridge-agent
//!
//! The agent side of the bridge: everything that touches the game server
//! process. The agent locates the server installation, launches the server
//! under supervision, turns its stdout/stderr into structured log events,
//! tracks lifecycle state, writes console commands to the server's stdin,
//! and scavenges the console command registry from `help` output.
//!
//! The hub talks to the agent exclusively through [`AgentHandle`]: a
//! broadcast channel of [`AgentEvent`]s and an mpsc channel of
//! [`AgentRequest`]s answered over oneshots.

pub mod agent;
pub mod assets;
pub mod commands;
pub mod config;
pub mod install;
pub mod logparse;
pub mod process;

pub use agent::{AgentEvent, AgentHandle, AgentRequest, DevAgent};
pub use commands::CommandRegistry;
pub use config::{AssetRedirect, LaunchConfig, ResolvedLaunch};
pub use logparse::LogLineParser;
pub use process::ServerProcess;
