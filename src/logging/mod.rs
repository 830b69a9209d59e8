// Logging module - tracing subscriber setup and in-memory log capture
//
// `init` installs the global subscriber: stdout formatting plus an optional
// rolling JSON file. `CaptureLayer` keeps events in a bounded buffer so the
// `render` command (and tests) can inspect what a request logged.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogRotation, LoggingConfig};

/// Maximum number of log entries to keep in memory
const MAX_LOG_ENTRIES: usize = 1000;

/// A single log entry captured from tracing
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// In-memory log buffer with bounded size (ring buffer)
#[derive(Clone, Default)]
pub struct LogBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a log entry, dropping the oldest when full
    pub fn add(&self, entry: LogEntry) {
        let mut entries = self.lock();
        if entries.len() >= MAX_LOG_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// All entries, most recent last
    pub fn get_all(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Entries at `level` or more severe
    pub fn at_least(&self, level: Level) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|entry| entry.level <= level)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Tracing layer that copies every event into a `LogBuffer`
pub struct CaptureLayer {
    buffer: LogBuffer,
}

impl CaptureLayer {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut message = String::new();
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        self.buffer.add(LogEntry {
            timestamp: Utc::now(),
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message,
        });
    }
}

/// Visitor to extract the message from a tracing event
struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{:?}", value);
            // Remove the quotes that Debug adds
            if self.0.len() >= 2 && self.0.starts_with('"') && self.0.ends_with('"') {
                *self.0 = self.0[1..self.0.len() - 1].to_string();
            }
        }
    }
}

/// Default filter when `RUST_LOG` is unset
pub fn default_directive(level: &str) -> String {
    format!("trellis={},tower_http=debug,axum=debug", level)
}

/// Install the global subscriber
///
/// Precedence: RUST_LOG env var > config file > default "info". The
/// returned guard flushes the file writer and must live as long as the
/// program.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

    if !config.file_enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&config.file_dir) {
        eprintln!(
            "Warning: Could not create log directory {:?}: {}",
            config.file_dir, e
        );
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return None;
    }

    let file_appender = match config.file_rotation {
        LogRotation::Hourly => tracing_appender::rolling::hourly(&config.file_dir, &config.file_prefix),
        LogRotation::Daily => tracing_appender::rolling::daily(&config.file_dir, &config.file_prefix),
        LogRotation::Never => tracing_appender::rolling::never(&config.file_dir, &config.file_prefix),
    };

    // Writes happen on a background thread
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    Some(guard)
}

/// Run `f` with a subscriber that records into the returned buffer
///
/// Only events on the current thread are captured.
pub fn capture<T>(f: impl FnOnce() -> T) -> (T, LogBuffer) {
    let buffer = LogBuffer::new();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer::new(buffer.clone()));
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records_messages_and_levels() {
        let ((), logs) = capture(|| {
            tracing::debug!(page = "Index", "Rendered {}", "Index");
            tracing::error!("Render failed");
        });

        let all = logs.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "Rendered Index");
        assert_eq!(all[0].level, Level::DEBUG);

        let errors = logs.at_least(Level::WARN);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Render failed");
    }

    #[test]
    fn test_buffer_is_bounded() {
        let buffer = LogBuffer::new();
        for i in 0..MAX_LOG_ENTRIES + 5 {
            buffer.add(LogEntry {
                timestamp: Utc::now(),
                level: Level::INFO,
                target: "trellis".to_string(),
                message: i.to_string(),
            });
        }
        let all = buffer.get_all();
        assert_eq!(all.len(), MAX_LOG_ENTRIES);
        assert_eq!(all[0].message, "5");

        buffer.clear();
        assert!(buffer.get_all().is_empty());
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(
            default_directive("debug"),
            "trellis=debug,tower_http=debug,axum=debug"
        );
    }
}
