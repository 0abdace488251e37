//! In-memory log sink feeding the Logs tab.
//!
//! A [`LogBufferLayer`] is installed next to the env filter in TUI mode, so
//! nothing is written to the terminal while the alternate screen is active.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing_subscriber::Layer;

/// Lines kept before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// Bounded ring buffer shared between the tracing layer and the UI.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<LogLine>>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append a line, evicting the oldest when full.
    pub fn push(&self, line: LogLine) {
        // A poisoned lock only means a panic elsewhere mid-push; the deque is still usable.
        let mut buffer = match self.inner.lock() {
            Ok(buffer) => buffer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `count` lines ending `scroll` lines before the newest, oldest first.
    pub fn window(&self, count: usize, scroll: usize) -> Vec<LogLine> {
        let Ok(buffer) = self.inner.lock() else {
            return Vec::new();
        };
        let end = buffer.len().saturating_sub(scroll);
        let start = end.saturating_sub(count);
        buffer.range(start..end).cloned().collect()
    }
}

/// Tracing layer that records every event into a [`LogBuffer`].
pub struct LogBufferLayer {
    buffer: LogBuffer,
}

impl LogBufferLayer {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S> Layer<S> for LogBufferLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogLine {
            level: metadata.level().into(),
            target: metadata.target().to_string(),
            message: visitor.finish(),
        });
    }
}

/// Collects the `message` field and appends any other fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.join(" ")
        } else {
            format!("{} {}", self.message, self.fields.join(" "))
        }
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn line(message: &str) -> LogLine {
        LogLine {
            level: LogLevel::Info,
            target: "test".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_log_level_order() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert_eq!(LogLevel::from(&tracing::Level::WARN).as_str(), "WARN");
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let buffer = LogBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.push(line(&format!("m{}", i)));
        }
        assert_eq!(buffer.len(), 3);
        let all: Vec<_> = buffer.window(10, 0).into_iter().map(|l| l.message).collect();
        assert_eq!(all, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_window_with_scroll() {
        let buffer = LogBuffer::default();
        assert!(buffer.is_empty());
        for i in 0..10 {
            buffer.push(line(&format!("m{}", i)));
        }
        let msgs = |v: Vec<LogLine>| v.into_iter().map(|l| l.message).collect::<Vec<_>>();
        assert_eq!(msgs(buffer.window(2, 0)), vec!["m8", "m9"]);
        assert_eq!(msgs(buffer.window(2, 3)), vec!["m5", "m6"]);
        assert_eq!(msgs(buffer.window(5, 20)), Vec::<String>::new());
    }

    #[test]
    fn test_clones_share_storage() {
        let buffer = LogBuffer::default();
        let clone = buffer.clone();
        buffer.push(line("shared"));
        assert_eq!(clone.len(), 1);
    }

    #[test]
    fn test_layer_captures_message_and_fields() {
        let buffer = LogBuffer::default();
        let subscriber =
            tracing_subscriber::registry().with(LogBufferLayer::new(buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(frames = 3, "Scan stopped");
            tracing::info!("plain {}", 42);
        });

        let lines = buffer.window(10, 0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].level, LogLevel::Warn);
        assert_eq!(lines[0].message, "Scan stopped frames=3");
        assert_eq!(lines[1].message, "plain 42");
    }
}
