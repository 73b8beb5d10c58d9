//! Append-only, human-readable event logs.
//!
//! Each event becomes one line: `<rfc3339 timestamp> [<channel>] <message>`.
//! The lines are for people reading them later; nothing parses them back.

use chrono::{SecondsFormat, Utc};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Which log file an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventChannel {
    /// Path and command access decisions.
    Access,
    /// Spawned commands.
    Command,
    /// Everything else.
    Diagnostic,
}

impl EventChannel {
    fn file_name(self) -> &'static str {
        match self {
            Self::Access => "access.log",
            Self::Command => "commands.log",
            Self::Diagnostic => "server.log",
        }
    }
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Access => write!(f, "access"),
            Self::Command => write!(f, "command"),
            Self::Diagnostic => write!(f, "diagnostic"),
        }
    }
}

#[derive(Debug)]
enum Sink {
    Disabled,
    Directory(PathBuf),
    Memory(Mutex<Vec<(EventChannel, String)>>),
}

/// Sink for the access, command and diagnostic logs.
///
/// Writes never fail from the caller's point of view: an unwritable log
/// file is reported through `tracing` at debug level and otherwise ignored.
#[derive(Debug)]
pub struct EventLog {
    sink: Sink,
    // Serializes appends so concurrent events never interleave within a line.
    write_lock: Mutex<()>,
}

impl EventLog {
    /// Append events to `access.log`, `commands.log` and `server.log` in `dir`.
    ///
    /// The directory is created lazily on the first write.
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::with_sink(Sink::Directory(dir.into()))
    }

    /// A log that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self::with_sink(Sink::Disabled)
    }

    /// A log that keeps events in memory, for inspection in tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_sink(Sink::Memory(Mutex::new(Vec::new())))
    }

    fn with_sink(sink: Sink) -> Self {
        Self {
            sink,
            write_lock: Mutex::new(()),
        }
    }

    /// Directory the log files live in, if file-backed.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        match &self.sink {
            Sink::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    /// Record an access decision.
    pub fn access(&self, operation: impl fmt::Display, path: &Path, allowed: bool) {
        let outcome = if allowed { "ALLOW" } else { "DENY" };
        self.record(
            EventChannel::Access,
            &format!("{operation} {} {outcome}", path.display()),
        );
    }

    /// Record a spawned command.
    pub fn command(&self, pid: u32, command: &str) {
        self.record(EventChannel::Command, &format!("pid={pid} {command}"));
    }

    /// Record a diagnostic message.
    pub fn diagnostic(&self, message: &str) {
        self.record(EventChannel::Diagnostic, message);
    }

    /// Append one event line to `channel`.
    pub fn record(&self, channel: EventChannel, message: &str) {
        // One event is one line, whatever the message contains.
        let message = message.replace(['\r', '\n'], " ");

        match &self.sink {
            Sink::Disabled => {},
            Sink::Memory(events) => {
                if let Ok(mut events) = events.lock() {
                    events.push((channel, message));
                }
            },
            Sink::Directory(dir) => {
                let line = format!(
                    "{} [{channel}] {message}\n",
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
                );
                let _guard = self.write_lock.lock();
                if let Err(e) = append_line(dir, channel, &line) {
                    debug!(channel = %channel, error = %e, "failed to append event log line");
                }
            },
        }
    }

    /// Events captured by an in-memory log for `channel`, oldest first.
    ///
    /// Always empty for file-backed and disabled logs.
    #[must_use]
    pub fn captured(&self, channel: EventChannel) -> Vec<String> {
        match &self.sink {
            Sink::Memory(events) => events
                .lock()
                .map(|events| {
                    events
                        .iter()
                        .filter(|(c, _)| *c == channel)
                        .map(|(_, m)| m.clone())
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::disabled()
    }
}

fn append_line(dir: &Path, channel: EventChannel, line: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(channel.file_name()))?;
    file.write_all(line.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_captures_by_channel() {
        let log = EventLog::in_memory();
        log.access("read", Path::new("/tmp/a"), true);
        log.access("write", Path::new("/etc/passwd"), false);
        log.command(42, "echo hi");
        log.diagnostic("policy reloaded");

        assert_eq!(
            log.captured(EventChannel::Access),
            vec!["read /tmp/a ALLOW", "write /etc/passwd DENY"]
        );
        assert_eq!(log.captured(EventChannel::Command), vec!["pid=42 echo hi"]);
        assert_eq!(log.captured(EventChannel::Diagnostic), vec!["policy reloaded"]);
    }

    #[test]
    fn test_file_sink_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::in_dir(dir.path().join("logs"));
        log.command(7, "printf 'a\nb'");
        log.command(8, "true");

        let content = std::fs::read_to_string(dir.path().join("logs/commands.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[command] pid=7 printf 'a b'"));
        assert!(lines[1].ends_with("[command] pid=8 true"));
    }

    #[test]
    fn test_disabled_log_is_silent() {
        let log = EventLog::disabled();
        log.diagnostic("nothing");
        assert!(log.captured(EventChannel::Diagnostic).is_empty());
        assert!(log.directory().is_none());
    }

    #[test]
    fn test_unwritable_directory_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        // A regular file where the log directory should be.
        let log = EventLog::in_dir(&blocker);
        log.diagnostic("dropped");
    }
}
