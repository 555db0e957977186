//! Console command registry
//!
//! The server has no introspection API, so the registry is scavenged from
//! the server's own `help` output: once the server is running the agent
//! sends `help` and parses the lines that follow. Collection stops at the
//! first non-matching line after at least one entry matched, or after a
//! hard line cap.

use devbridge_core::{CommandInfo, Suggestion};

/// Give up scavenging after this many lines without closure
const MAX_SCAVENGE_LINES: usize = 200;

/// Registry of console commands known to the server
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<CommandInfo>,
    collecting: bool,
    scanned: usize,
    matched: bool,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start scavenging help output. Clears previously collected entries.
    pub fn begin_collection(&mut self) {
        self.commands.clear();
        self.collecting = true;
        self.scanned = 0;
        self.matched = false;
    }

    /// Whether log lines should currently be fed to [`ingest`](Self::ingest)
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Feed one log line while collecting. Returns true when the line was
    /// consumed as a registry entry.
    pub fn ingest(&mut self, line: &str) -> bool {
        if !self.collecting {
            return false;
        }

        self.scanned += 1;
        if self.scanned > MAX_SCAVENGE_LINES {
            self.collecting = false;
            return false;
        }

        match parse_help_line(line) {
            Some(info) => {
                self.matched = true;
                if !self.commands.iter().any(|c| c.name == info.name) {
                    self.commands.push(info);
                }
                true
            }
            None => {
                // Help output is contiguous: the first miss after a hit ends it
                if self.matched {
                    self.collecting = false;
                }
                false
            }
        }
    }

    /// Snapshot of the collected registry; empty until help output arrived
    pub fn commands(&self) -> Vec<CommandInfo> {
        self.commands.clone()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Complete the command word of a console input. Only the first word is
    /// completed; argument completion would need server cooperation.
    pub fn suggest(&self, input: &str, cursor: usize) -> Vec<Suggestion> {
        let cursor = cursor.min(input.len());
        let prefix = &input[..cursor];

        // Commands only complete at the start of the input
        if prefix.contains(' ') {
            return Vec::new();
        }

        let (slash, word) = match prefix.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, prefix),
        };

        self.commands
            .iter()
            .filter(|c| c.name.starts_with(word))
            .map(|c| Suggestion {
                text: if slash {
                    format!("/{}", c.name)
                } else {
                    c.name.clone()
                },
                replace_from: 0,
            })
            .collect()
    }
}

/// Parse one line of help output into a registry entry.
///
/// Accepted shapes (leading slash optional):
///   /tp <player> <target> - Teleport a player
///   gamemode <mode>
///   stop - Shut the server down
///   seed
fn parse_help_line(line: &str) -> Option<CommandInfo> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.ends_with(':') {
        // Blank lines and "Available commands:" style headers
        return None;
    }

    let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };

    if name.is_empty()
        || !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return None;
    }

    let (usage, description) = if let Some(desc) = rest.strip_prefix("- ") {
        (None, Some(desc.trim().to_string()))
    } else if let Some(idx) = rest.find(" - ") {
        (
            Some(rest[..idx].trim().to_string()),
            Some(rest[idx + 3..].trim().to_string()),
        )
    } else if rest.is_empty() {
        (None, None)
    } else if rest.starts_with('<') || rest.starts_with('[') {
        (Some(rest.to_string()), None)
    } else {
        // Prose line ("Use help <command> for details"), not an entry
        return None;
    };

    Some(CommandInfo {
        name: name.to_string(),
        usage,
        description,
    })
}
