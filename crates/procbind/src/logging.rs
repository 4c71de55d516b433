//! Logging integration.
//!
//! Components log through an injected [`Logger`] rather than a global. A
//! logger wraps a `tracing` dispatcher, so callers can route the library's
//! events anywhere: the ambient subscriber ([`Logger::current`]), nowhere
//! ([`Logger::disabled`]) or an in-memory buffer ([`Logger::capture`]).

use std::fmt::Write as FmtWrite;
use std::sync::{Arc, Mutex};

use tracing::level_filters::LevelFilter;
use tracing::{error, Dispatch, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::{DataAccessError, Result};
use crate::params::Parameter;

/// Install a process-wide `fmt` subscriber.
///
/// `verbosity` is one of debug/info/warn/error; `format` is `text` or `json`.
/// `RUST_LOG` overrides the level when set.
pub fn init_logging(verbosity: &str, format: &str) -> Result<()> {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| DataAccessError::Config(format!("failed to install logger: {}", e)))
}

/// Logging dependency handed to sessions and data-access facades.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
    log_parameter_values: bool,
}

impl Logger {
    /// Logger routing events to the given dispatcher.
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch,
            log_parameter_values: true,
        }
    }

    /// Logger bound to the dispatcher that is current on this thread.
    pub fn current() -> Self {
        Self::new(tracing::dispatcher::get_default(Dispatch::clone))
    }

    /// Logger that drops every event.
    pub fn disabled() -> Self {
        Self::new(Dispatch::none())
    }

    /// Logger writing into a fresh in-memory buffer.
    pub fn capture() -> (Self, LogBuffer) {
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::registry()
            .with(LevelFilter::TRACE)
            .with(MemoryLogLayer::new(buffer.clone()));
        (Self::new(Dispatch::new(subscriber)), buffer)
    }

    /// Whether call-failure events include parameter values.
    pub fn with_parameter_values(mut self, enabled: bool) -> Self {
        self.log_parameter_values = enabled;
        self
    }

    /// Run `f` with this logger's dispatcher as the thread default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Record a failed call with its procedure and parameters.
    pub fn call_failed(&self, procedure: &str, parameters: &[Parameter], err: &DataAccessError) {
        let rendered = self.render_parameters(parameters);
        self.in_scope(|| {
            error!(
                procedure,
                parameters = %rendered,
                "{}",
                err.format_detailed().trim_end()
            );
        });
    }

    fn render_parameters(&self, parameters: &[Parameter]) -> String {
        let mut out = String::new();
        for (i, p) in parameters.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            if self.log_parameter_values {
                let _ = write!(out, "{} = {}", p.name, p.display_value());
            } else {
                let _ = write!(out, "{} = ***", p.name);
            }
        }
        out
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::current()
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("log_parameter_values", &self.log_parameter_values)
            .finish_non_exhaustive()
    }
}

/// One captured event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Shared buffer filled by a [`MemoryLogLayer`].
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogBuffer {
    fn push(&self, record: LogRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    /// Snapshot of everything captured so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Records at exactly `level`.
    pub fn at_level(&self, level: Level) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .collect()
    }

    /// Whether any captured message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.records().iter().any(|r| r.message.contains(needle))
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// A tracing layer that appends formatted events to a [`LogBuffer`].
pub struct MemoryLogLayer {
    buffer: LogBuffer,
}

impl MemoryLogLayer {
    pub fn new(buffer: LogBuffer) -> Self {
        Self { buffer }
    }
}

impl<S> Layer<S> for MemoryLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogRecord {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
        });
    }
}

/// Flattens an event into `message key=value ...`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl MessageVisitor {
    fn field(&mut self, name: &str, value: impl std::fmt::Display) {
        if !self.message.is_empty() {
            self.message.push(' ');
        }
        let _ = write!(self.message, "{}={}", name, value);
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let mut rendered = format!("{:?}", value);
            if !self.message.is_empty() {
                rendered.push(' ');
                rendered.push_str(&self.message);
            }
            self.message = rendered;
        } else {
            self.field(field.name(), format_args!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.record_debug(field, &format_args!("{}", value));
        } else {
            self.field(field.name(), value);
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.field(field.name(), value);
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.field(field.name(), value);
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.field(field.name(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DbType;

    #[test]
    fn test_capture_records_events() {
        let (logger, buffer) = Logger::capture();
        logger.in_scope(|| {
            tracing::info!(rows = 3u64, "filled table");
            tracing::debug!("text command");
        });

        let records = buffer.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::INFO);
        assert_eq!(records[0].message, "filled table rows=3");
        assert_eq!(buffer.at_level(Level::DEBUG).len(), 1);
    }

    #[test]
    fn test_call_failed_lists_parameters() {
        let (logger, buffer) = Logger::capture();
        let params = vec![
            Parameter::value("@Name", DbType::VarChar, "Ada"),
            Parameter::null_marker("@Age", DbType::Int),
        ];
        logger.call_failed(
            "dbo.SavePerson",
            &params,
            &DataAccessError::command("constraint violated", ""),
        );

        let errors = buffer.at_level(Level::ERROR);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("constraint violated"));
        assert!(errors[0].message.contains("procedure=dbo.SavePerson"));
        assert!(errors[0].message.contains("@Name = Ada, @Age = NULL"));
    }

    #[test]
    fn test_parameter_values_can_be_redacted() {
        let (logger, buffer) = Logger::capture();
        let logger = logger.with_parameter_values(false);
        let params = vec![Parameter::value("@Password", DbType::VarChar, "hunter2")];
        logger.call_failed("dbo.Login", &params, &DataAccessError::TokenRejected);

        assert!(buffer.contains("@Password = ***"));
        assert!(!buffer.contains("hunter2"));
    }

    #[test]
    fn test_disabled_logger_drops_events() {
        let (capturing, buffer) = Logger::capture();
        capturing.in_scope(|| {
            Logger::disabled().in_scope(|| tracing::error!("dropped"));
            tracing::warn!("kept");
        });
        assert_eq!(buffer.records().len(), 1);
        assert!(buffer.contains("kept"));
    }
}
