//! Where a monitor reports its log lines and lifecycle changes.
//!
//! A monitor never talks to a UI directly. It is handed an `Arc<dyn MonitorSink>` and
//! reports through it; [`TracingSink`] forwards to `tracing`, [`LogBuffer`] keeps a
//! bounded in-memory history that a control surface (or a test) can read back.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::Level;

const MAX_LOG_ENTRIES: usize = 1000;

/// Lifecycle status reported by a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    /// The polling loop was started.
    Running,
    /// The polling loop ended.
    Stopped,
    /// No data source was found; the worker exited without polling.
    SourceMissing,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MonitorStatus::Running => "running",
            MonitorStatus::Stopped => "stopped",
            MonitorStatus::SourceMissing => "source missing",
        };
        f.write_str(label)
    }
}

/// Receiver of monitor output. Called from the worker task, so it must be cheap.
pub trait MonitorSink: Send + Sync {
    /// A human-readable log line.
    fn log(&self, level: Level, message: &str);
    /// A lifecycle transition.
    fn status(&self, status: MonitorStatus);
}

/// Forwards everything to `tracing` under the monitor's user id.
#[derive(Debug, Clone)]
pub struct TracingSink {
    user_id: String,
}

impl TracingSink {
    /// Sink tagging every event with `user_id`.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl MonitorSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        let user_id = self.user_id.as_str();
        match level {
            Level::ERROR => tracing::error!(user_id, "{message}"),
            Level::WARN => tracing::warn!(user_id, "{message}"),
            Level::INFO => tracing::info!(user_id, "{message}"),
            Level::DEBUG => tracing::debug!(user_id, "{message}"),
            _ => tracing::trace!(user_id, "{message}"),
        }
    }

    fn status(&self, status: MonitorStatus) {
        tracing::info!(user_id = self.user_id.as_str(), %status, "monitor status changed");
    }
}

/// A single captured log line.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Local time the line was recorded
    pub timestamp: DateTime<Local>,
    pub level: Level,
    /// Message text without level or timestamp
    pub message: String,
}

#[derive(Debug, Default)]
struct BufferState {
    entries: VecDeque<LogEntry>,
    statuses: Vec<MonitorStatus>,
}

/// A thread-safe, fixed-capacity log buffer that also records every status change.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<BufferState>>);

impl LogBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the retained log lines, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.0.lock().entries.iter().cloned().collect()
    }

    /// Every status reported so far, in order.
    pub fn statuses(&self) -> Vec<MonitorStatus> {
        self.0.lock().statuses.clone()
    }

    /// Most recent status, if any was reported.
    pub fn latest_status(&self) -> Option<MonitorStatus> {
        self.0.lock().statuses.last().copied()
    }

    /// True if any retained line at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.0
            .lock()
            .entries
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    /// Drops all lines and statuses.
    pub fn clear(&self) {
        let mut state = self.0.lock();
        state.entries.clear();
        state.statuses.clear();
    }
}

impl MonitorSink for LogBuffer {
    fn log(&self, level: Level, message: &str) {
        let mut state = self.0.lock();
        if state.entries.len() >= MAX_LOG_ENTRIES {
            state.entries.pop_front();
        }
        state.entries.push_back(LogEntry {
            timestamp: Local::now(),
            level,
            message: message.to_string(),
        });
    }

    fn status(&self, status: MonitorStatus) {
        self.0.lock().statuses.push(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_bounded() {
        let buffer = LogBuffer::new();
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            buffer.log(Level::INFO, &format!("line {i}"));
        }
        let entries = buffer.entries();
        assert_eq!(entries.len(), MAX_LOG_ENTRIES);
        assert_eq!(entries[0].message, "line 5");
    }

    #[test]
    fn test_status_history() {
        let buffer = LogBuffer::new();
        assert_eq!(buffer.latest_status(), None);
        buffer.status(MonitorStatus::Running);
        buffer.status(MonitorStatus::Stopped);
        assert_eq!(
            buffer.statuses(),
            vec![MonitorStatus::Running, MonitorStatus::Stopped]
        );
        buffer.log(Level::WARN, "upload failed: timeout");
        assert!(buffer.contains(Level::WARN, "upload failed"));
        assert!(!buffer.contains(Level::ERROR, "upload failed"));

        buffer.clear();
        assert!(buffer.entries().is_empty());
        assert_eq!(buffer.latest_status(), None);
    }
}
