//! Time and Logging Abstractions
//!
//! Injectable time source and logging sink. Shuffle sessions take their seed
//! from [`Clock::unix_timestamp_millis`], so tests drive a [`ManualClock`] to get
//! reproducible permutations.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::Result;

/// Time source trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::time::Clock;
///
/// fn fresh_seed(clock: &dyn Clock) -> i64 {
///     clock.unix_timestamp_millis()
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Get current Unix timestamp in seconds
    fn unix_timestamp(&self) -> i64 {
        self.now().timestamp()
    }

    /// Get current Unix timestamp in milliseconds
    fn unix_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// System clock implementation using actual system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
///
/// Each call to [`ManualClock::advance_millis`] moves time forward; reads never
/// move it. Useful for asserting on seeds derived from the clock.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_millis),
        }
    }

    pub fn advance_millis(&self, delta: i64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    fn unix_timestamp_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Target module/component
    pub target: String,
    pub message: String,
    /// Structured fields
    pub fields: HashMap<String, String>,
    /// Name of the span the event was emitted in
    pub span_id: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: HashMap::new(),
            span_id: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }
}

/// Logger sink trait
///
/// Forwards structured logs from the core to host logging pipelines
/// (OSLog, Logcat, journald, a file). Implementations must not log remote
/// catalog credentials; `core_runtime::logging::redact_if_sensitive` helps.
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    /// Forward a log entry to the host logging system
    async fn log(&self, entry: LogEntry) -> Result<()>;

    /// Flush any buffered logs
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Minimum level this sink wants to see
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Console logger implementation for testing/development
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    pub min_level: LogLevel,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

#[async_trait::async_trait]
impl LoggerSink for ConsoleLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        if entry.level < self.min_level {
            return Ok(());
        }

        let level_str = match entry.level {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };

        let mut fields: Vec<_> = entry.fields.iter().collect();
        fields.sort();
        let rendered: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();

        eprintln!(
            "[{}] {} {}: {} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            level_str,
            entry.target,
            entry.message,
            rendered.join(" ")
        );
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock() {
        let clock = SystemClock;
        assert!(clock.unix_timestamp() > 0);
        assert!(clock.unix_timestamp_millis() >= clock.unix_timestamp() * 1000 - 1000);
    }

    #[test]
    fn test_manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.unix_timestamp_millis(), 1_000);
        assert_eq!(clock.unix_timestamp_millis(), 1_000);

        clock.advance_millis(250);
        assert_eq!(clock.unix_timestamp_millis(), 1_250);
        assert_eq!(clock.now().timestamp_millis(), 1_250);

        clock.set_millis(5);
        assert_eq!(clock.unix_timestamp(), 0);
    }

    #[test]
    fn test_log_entry_builder() {
        let entry = LogEntry::new(LogLevel::Warn, "core_federation", "Source load failed")
            .with_field("source", "subsonic:home")
            .with_span_id("load_songs");

        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.target, "core_federation");
        assert_eq!(
            entry.fields.get("source"),
            Some(&"subsonic:home".to_string())
        );
        assert_eq!(entry.span_id, Some("load_songs".to_string()));
    }

    #[tokio::test]
    async fn test_console_logger_filters_below_min_level() {
        let logger = ConsoleLogger {
            min_level: LogLevel::Error,
        };
        let entry = LogEntry::new(LogLevel::Debug, "test", "quiet");

        logger.log(entry).await.unwrap();
        assert_eq!(logger.min_level(), LogLevel::Error);
    }
}
