//! # Logging & Tracing Infrastructure
//!
//! Provides structured logging with the `tracing` crate, supporting:
//! - JSON, pretty and compact output formats
//! - Module-level filtering
//! - Redaction of remote catalog credentials
//! - Integration with host logging via `LoggerSink`
//!
//! ## Overview
//!
//! This module configures the `tracing-subscriber` infrastructure and forwards
//! events to a platform logging system through the `LoggerSink` trait. When a
//! sink is configured, every event that survives filtering is mirrored to the
//! host logger while still flowing through the fmt layer.
//!
//! Backend failures during aggregation are reported at `warn` through this
//! channel; they never surface as errors to callers.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use bridge_traits::time::{ConsoleLogger, LogLevel};
//! use std::sync::Arc;
//!
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Compact)
//!     .with_level(LogLevel::Debug)
//!     .with_logger_sink(Arc::new(ConsoleLogger::default()));
//!
//! init_logging(config)?;
//! tracing::info!(sources = 3, "Aggregation started");
//! ```

use crate::error::{Error, Result};
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_async::runtime;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer, Registry,
};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format with colors
    Pretty,
    /// Structured JSON format for machine parsing
    Json,
    /// Compact format for production
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        return Self::Pretty;

        #[cfg(not(debug_assertions))]
        return Self::Json;
    }
}

/// Logging configuration
#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Minimum log level
    pub level: LogLevel,
    /// Redact credential-like fields before they reach the sink
    pub redact_pii: bool,
    /// Custom filter string (e.g., "core_federation=debug,core_playback=trace")
    pub filter: Option<String>,
    /// Optional logger sink for forwarding logs to host
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Emit span enter/exit events
    pub enable_spans: bool,
    pub display_target: bool,
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            redact_pii: true,
            filter: None,
            logger_sink: None,
            enable_spans: true,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("redact_pii", &self.redact_pii)
            .field("filter", &self.filter)
            .field("logger_sink", &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"))
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_pii_redaction(mut self, redact: bool) -> Self {
        self.redact_pii = redact;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set logger sink for host integration
    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }
}

/// Initialize the logging system
///
/// This should be called once during application startup. Subsequent calls
/// return an error.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let span_events = if config.enable_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(config.display_target)
            .with_thread_ids(config.display_thread_info)
            .with_thread_names(config.display_thread_info)
            .with_span_events(span_events)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(config.enable_spans)
            .with_target(config.display_target)
            .with_thread_ids(config.display_thread_info)
            .with_thread_names(config.display_thread_info)
            .with_writer(io::stdout)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(config.display_target)
            .with_thread_ids(config.display_thread_info)
            .with_thread_names(config.display_thread_info)
            .with_writer(io::stdout)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(LoggerSinkLayer::new(config.logger_sink.clone(), config.redact_pii))
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

const WORKSPACE_CRATES: &[&str] = &[
    "core_async",
    "core_runtime",
    "core_library",
    "core_federation",
    "core_playback",
    "core_service",
    "bridge_desktop",
];

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let base_level = match config.level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };

    let filter_string = match &config.filter {
        Some(custom_filter) => custom_filter.clone(),
        None => {
            // Our crates at the configured level, dependencies at warn.
            let mut directives: Vec<String> = WORKSPACE_CRATES
                .iter()
                .map(|name| format!("{name}={base_level}"))
                .collect();
            directives.push("sqlx=warn".to_string());
            directives.join(",")
        }
    };

    EnvFilter::try_new(filter_string)
        .map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

/// Layer that forwards events to a `LoggerSink` implementation.
struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
    redact: bool,
}

impl LoggerSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>, redact: bool) -> Self {
        Self { sink, redact }
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };

        let metadata = event.metadata();
        let level = tracing_level_to_log_level(*metadata.level());

        if level < sink.min_level() {
            return;
        }

        let mut visitor = SinkVisitor {
            redact: self.redact,
            ..SinkVisitor::default()
        };
        event.record(&mut visitor);

        let message = visitor
            .message
            .unwrap_or_else(|| metadata.name().to_string());

        let mut entry = LogEntry::new(level, metadata.target(), message);

        for (key, value) in visitor.fields {
            entry = entry.with_field(key, value);
        }

        if let Some(span) = ctx.lookup_current() {
            entry = entry.with_span_id(span.name());
        }

        let sink = Arc::clone(sink);

        if let Ok(handle) = runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = sink.log(entry).await {
                    eprintln!("LoggerSink error: {}", err);
                }
            });
            return;
        }

        match runtime::block_on(async move { sink.log(entry).await }) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => eprintln!("LoggerSink error: {}", err),
            Err(err) => eprintln!("LoggerSink runtime error: {}", err),
        }
    }
}

#[derive(Default)]
struct SinkVisitor {
    redact: bool,
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl SinkVisitor {
    fn record_value(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else if self.redact {
            self.fields.insert(
                field.name().to_string(),
                redact_if_sensitive(field.name(), &value),
            );
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for SinkVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record_value(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_value(field, format!("{:?}", value));
    }
}

fn tracing_level_to_log_level(level: tracing::Level) -> LogLevel {
    match level {
        tracing::Level::TRACE => LogLevel::Trace,
        tracing::Level::DEBUG => LogLevel::Debug,
        tracing::Level::INFO => LogLevel::Info,
        tracing::Level::WARN => LogLevel::Warn,
        tracing::Level::ERROR => LogLevel::Error,
    }
}

/// Redacts credential-like values by field name.
///
/// Remote catalog instances are configured with passwords and API tokens;
/// use this when a field might carry one:
///
/// ```
/// use core_runtime::logging::redact_if_sensitive;
///
/// assert_eq!(redact_if_sensitive("api_key", "abc"), "[REDACTED]");
/// assert_eq!(redact_if_sensitive("instance", "living-room"), "living-room");
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    const SENSITIVE_FIELDS: &[&str] = &[
        "token",
        "password",
        "secret",
        "api_key",
        "apikey",
        "authorization",
        "salt",
    ];

    let field_lower = field_name.to_lowercase();
    if SENSITIVE_FIELDS.iter().any(|&f| field_lower.contains(f)) {
        "[REDACTED]".to_string()
    } else if let Some(at_pos) = value.find('@').filter(|_| value.contains('.')) {
        // Likely an email or a user@host URL.
        format!("{}***@[REDACTED]", &value[..1.min(at_pos)])
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as SinkResult;
    use std::sync::Mutex;

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_level(LogLevel::Debug)
            .with_pii_redaction(false)
            .with_filter("core_federation=trace")
            .with_spans(false)
            .with_thread_info(true);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert!(!config.redact_pii);
        assert_eq!(config.filter, Some("core_federation=trace".to_string()));
        assert!(!config.enable_spans);
        assert!(config.display_thread_info);
    }

    #[test]
    fn test_redact_if_sensitive() {
        assert_eq!(redact_if_sensitive("access_token", "secret123"), "[REDACTED]");
        assert_eq!(redact_if_sensitive("Password", "pass"), "[REDACTED]");

        let redacted = redact_if_sensitive("user", "user@example.com");
        assert!(redacted.starts_with('u'));
        assert!(redacted.contains("[REDACTED]"));

        assert_eq!(redact_if_sensitive("song_id", "12345"), "12345");
        assert_eq!(redact_if_sensitive("title", "@home"), "@home");
    }

    #[test]
    fn test_build_filter_covers_workspace_crates() {
        let config = LoggingConfig::default().with_level(LogLevel::Debug);
        let filter = build_filter(&config).unwrap().to_string();
        assert!(filter.contains("core_federation=debug"));
        assert!(filter.contains("core_playback=debug"));
        assert!(filter.contains("sqlx=warn"));
    }

    #[test]
    fn test_build_custom_filter() {
        let config = LoggingConfig::default().with_filter("core_library=trace");
        let filter = build_filter(&config).unwrap();
        assert!(filter.to_string().contains("core_library=trace"));
    }

    #[test]
    fn test_invalid_filter_is_a_config_error() {
        let config = LoggingConfig::default().with_filter("core_library=[");
        assert!(matches!(build_filter(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_logger_sink_layer_forwards_and_redacts() {
        let sink = Arc::new(TestLoggerSink::default());
        let trait_sink: Arc<dyn LoggerSink> = sink.clone();
        let subscriber = tracing_subscriber::registry().with(LoggerSinkLayer::new(Some(trait_sink), true));
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::warn!(
            target: "core_federation",
            source = "subsonic:home",
            password = "hunter2",
            "Source load failed"
        );

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.target, "core_federation");
        assert_eq!(entry.message, "Source load failed");
        assert_eq!(entry.fields.get("source"), Some(&"subsonic:home".to_string()));
        assert_eq!(entry.fields.get("password"), Some(&"[REDACTED]".to_string()));
    }

    #[derive(Default)]
    struct TestLoggerSink {
        entries: Mutex<Vec<LogEntry>>,
    }

    #[async_trait]
    impl LoggerSink for TestLoggerSink {
        async fn log(&self, entry: LogEntry) -> SinkResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        fn min_level(&self) -> LogLevel {
            LogLevel::Trace
        }
    }
}
