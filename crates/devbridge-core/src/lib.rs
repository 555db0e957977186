//! # devbridge-core
//!
//! Core types shared across the devbridge crates:
//! - Log events and levels captured from the server process
//! - Server lifecycle states
//! - Console command metadata and suggestions
//! - Error types and wire-level error codes

pub mod command;
pub mod error;
pub mod log;
pub mod state;

pub use command::{Capability, CommandInfo, Suggestion};
pub use error::{BridgeError, Result, error_codes};
pub use log::{LogEvent, LogLevel};
pub use state::ServerState;
