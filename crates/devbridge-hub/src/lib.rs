//! # devbridge-hub
//!
//! The bridge side facing development tools: a WebSocket endpoint that
//! authenticates clients, negotiates the protocol hello, replays recent log
//! history, fans out agent events to every connected client, and routes
//! client requests to the agent over the in-process channel.

pub mod config;
pub mod history;
pub mod hub;
pub mod registry;
pub mod session;

pub use config::HubConfig;
pub use history::LogHistory;
pub use hub::BridgeHub;
pub use registry::{ClientRegistry, RegistryError};
