//! Log events captured from the server process

use serde::{Deserialize, Serialize};

/// Severity of a server log record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "PascalCase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    /// Level token was absent or unrecognized
    Unknown,
}

impl LogLevel {
    /// Map a level token from server output to a [`LogLevel`].
    ///
    /// Understands both java.util.logging names (SEVERE, FINE, ...) and the
    /// common short forms (WARN, DEBUG, ...). Matching is case-insensitive.
    pub fn parse(token: &str) -> LogLevel {
        match token.to_ascii_uppercase().as_str() {
            "SEVERE" | "ERROR" | "FATAL" => LogLevel::Error,
            "WARNING" | "WARN" => LogLevel::Warn,
            "INFO" => LogLevel::Info,
            "CONFIG" | "FINE" | "DEBUG" => LogLevel::Debug,
            "FINER" | "FINEST" | "TRACE" => LogLevel::Trace,
            _ => LogLevel::Unknown,
        }
    }

    /// Lowercase display form used by log-consuming tools
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Unknown => "unknown",
        }
    }
}

/// One log record captured from the server's output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogEvent {
    /// Capture time, Unix epoch milliseconds
    pub timestamp_ms: u64,

    /// Record severity
    pub level: LogLevel,

    /// Originating logger name, or the stream name for unstructured lines
    pub logger: String,

    /// Log message with framing stripped
    pub message: String,

    /// Thread that produced the record, when the format carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,

    /// Rendered stack trace attached to the record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throwable: Option<String>,
}

impl LogEvent {
    /// Build an event stamped with the current wall-clock time
    pub fn now(level: LogLevel, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: current_millis(),
            level,
            logger: logger.into(),
            message: message.into(),
            thread: None,
            throwable: None,
        }
    }
}

/// Unix epoch milliseconds for event timestamps
pub fn current_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_jul_names() {
        assert_eq!(LogLevel::parse("SEVERE"), LogLevel::Error);
        assert_eq!(LogLevel::parse("WARNING"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::parse("FINE"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("FINEST"), LogLevel::Trace);
    }

    #[test]
    fn test_level_parse_short_forms() {
        assert_eq!(LogLevel::parse("warn"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("Error"), LogLevel::Error);
        assert_eq!(LogLevel::parse("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("banana"), LogLevel::Unknown);
    }

    #[test]
    fn test_event_serialization_skips_empty_optionals() {
        let event = LogEvent::now(LogLevel::Info, "core", "hello");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"Level\":\"Info\""));
        assert!(!json.contains("Throwable"));
        assert!(!json.contains("Thread"));
    }
}
