//! Console command metadata and completion types

use serde::{Deserialize, Serialize};

/// Feature set the bridge advertises to clients during the hello
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum Capability {
    /// Log forwarding
    Logs,
    /// Command registry, suggestions, and execution
    Commands,
    /// Asset path redirection is active
    Assets,
}

/// One entry of the server's console command registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct CommandInfo {
    /// Command name without the leading slash
    pub name: String,

    /// Argument usage string as printed by the server, e.g. `<player> <item>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,

    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Completion candidate for a console input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Suggestion {
    /// Replacement text
    pub text: String,

    /// Byte offset in the input where the replacement starts
    pub replace_from: usize,
}
