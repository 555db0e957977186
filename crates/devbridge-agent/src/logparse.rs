//! Parsing of server output lines into structured log events
//!
//! The server writes java.util.logging-style lines such as
//! `[12:00:01] [INFO] [asset] loaded 42 packs`, sometimes followed by stack
//! trace continuation lines. The parser is stateful: a record is only
//! complete once the next record (or a flush) proves no more continuation
//! lines belong to it.

use devbridge_core::{LogEvent, LogLevel};

/// Stateful line parser for one output stream
pub struct LogLineParser {
    stream: String,
    default_level: LogLevel,
    pending: Option<LogEvent>,
}

impl LogLineParser {
    /// Create a parser for the named stream (`stdout`/`stderr`). Lines that
    /// carry no level token get `default_level`.
    pub fn new(stream: impl Into<String>, default_level: LogLevel) -> Self {
        Self {
            stream: stream.into(),
            default_level,
            pending: None,
        }
    }

    /// Stream name this parser was created for
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Feed one raw line. Returns the previous record when this line proves
    /// it complete (i.e. the line starts a new record).
    pub fn push_line(&mut self, line: &str) -> Option<LogEvent> {
        if line.trim().is_empty() {
            return self.pending.take();
        }

        if is_continuation(line) {
            if let Some(pending) = &mut self.pending {
                let throwable = pending.throwable.get_or_insert_with(String::new);
                if !throwable.is_empty() {
                    throwable.push('\n');
                }
                throwable.push_str(line.trim_end());
                return None;
            }
            // Continuation with nothing to attach to: degrade to a record
        }

        let completed = self.pending.take();
        self.pending = Some(self.parse_record(line));
        completed
    }

    /// Yield the buffered record, if any. Call when the stream ends.
    pub fn flush(&mut self) -> Option<LogEvent> {
        self.pending.take()
    }

    fn parse_record(&self, line: &str) -> LogEvent {
        let mut rest = line;
        let mut level = None;
        let mut logger = None;
        let mut thread = None;

        while let Some((group, tail)) = take_bracket_group(rest) {
            rest = tail;

            if looks_like_time(group) {
                // Re-stamped at capture time; the server's clock is dropped
                continue;
            }

            // Minecraft-style combined group: [Server thread/INFO]
            if let Some((left, right)) = group.rsplit_once('/') {
                let parsed = LogLevel::parse(right);
                if parsed != LogLevel::Unknown {
                    thread = Some(left.to_string());
                    level = Some(parsed);
                    continue;
                }
            }

            let parsed = LogLevel::parse(group);
            if parsed != LogLevel::Unknown && level.is_none() {
                level = Some(parsed);
            } else if logger.is_none() {
                logger = Some(group.to_string());
            }
        }

        let message = rest
            .strip_prefix(':')
            .unwrap_or(rest)
            .trim()
            .to_string();

        let mut event = LogEvent::now(
            level.unwrap_or(self.default_level),
            logger.unwrap_or_else(|| self.stream.clone()),
            message,
        );
        event.thread = thread;
        event
    }
}

/// Split a leading `[group]` off the line, returning (group, rest)
fn take_bracket_group(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    let inner = trimmed.strip_prefix('[')?;
    let end = inner.find(']')?;
    Some((&inner[..end], &inner[end + 1..]))
}

/// Timestamp groups like `12:00:01` or `12:00:01.342`
fn looks_like_time(group: &str) -> bool {
    group.contains(':') && group.chars().all(|c| c.is_ascii_digit() || c == ':' || c == '.')
}

/// Stack trace continuation lines belong to the previous record
fn is_continuation(line: &str) -> bool {
    if line.starts_with(' ') || line.starts_with('\t') {
        return true;
    }
    let trimmed = line.trim_start();
    trimmed.starts_with("at ")
        || trimmed.starts_with("Caused by:")
        || trimmed.starts_with("Suppressed:")
        || trimmed.starts_with("...")
}
