use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("invalid logging.level '{0}'. Valid values: trace, debug, info, warn, error")]
    InvalidLevel(String),
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Collects event fields into a JSON object, renaming our `event_*` keys
/// to their dotted OTel names.
#[derive(Default)]
struct AttributeCollector {
    attributes: Map<String, Value>,
}

impl AttributeCollector {
    fn put(&mut self, field: &Field, value: Value) {
        let key = match field.name() {
            "event_name" => "event.name",
            "event_domain" => "event.domain",
            other => other,
        };
        self.attributes.insert(key.to_string(), value);
    }
}

impl Visit for AttributeCollector {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::from(format!("{:?}", value)));
    }
}

/// One JSON object per line, shaped after the OTel log data model.
#[derive(Clone)]
struct OtelLineFormatter {
    resource: Map<String, Value>,
}

impl OtelLineFormatter {
    fn new(config: &LoggingConfig) -> Self {
        let mut resource = Map::new();
        resource.insert(
            "service.name".to_string(),
            Value::from(config.service_name.as_str()),
        );
        resource.insert(
            "service.version".to_string(),
            Value::from(config.service_version.as_str()),
        );
        Self { resource }
    }

    fn severity_number(level: &Level) -> u64 {
        match *level {
            Level::TRACE => 1,
            Level::DEBUG => 5,
            Level::INFO => 9,
            Level::WARN => 13,
            Level::ERROR => 17,
        }
    }

    fn render(&self, event: &Event<'_>) -> Value {
        let metadata = event.metadata();
        let mut collector = AttributeCollector::default();
        event.record(&mut collector);
        let mut attributes = collector.attributes;

        let body = match attributes.remove("message") {
            Some(Value::String(s)) => s,
            _ => metadata.name().to_string(),
        };
        attributes.insert("code.target".to_string(), Value::from(metadata.target()));
        if let Some(file) = metadata.file() {
            attributes.insert("code.filepath".to_string(), Value::from(file));
        }
        if let Some(line) = metadata.line() {
            attributes.insert("code.lineno".to_string(), Value::from(line));
        }

        serde_json::json!({
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "severity_text": metadata.level().as_str(),
            "severity_number": Self::severity_number(metadata.level()),
            "body": body,
            "resource": Value::Object(self.resource.clone()),
            "attributes": Value::Object(attributes),
        })
    }
}

impl<S, N> FormatEvent<S, N> for OtelLineFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let line = serde_json::to_string(&self.render(event)).map_err(|_| std::fmt::Error)?;
        writer.write_str(&line)?;
        writer.write_char('\n')
    }
}

fn parse_level(level: &str) -> Result<LevelFilter, LoggingError> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        _ => Err(LoggingError::InvalidLevel(level.to_string())),
    }
}

/// Installs the global subscriber. `RUST_LOG` directives refine the configured level.
pub fn init_logging(logging_config: &LoggingConfig) -> Result<(), LoggingError> {
    let level_filter = parse_level(&logging_config.level)?;
    let filter_layer = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .from_env_lossy();

    let installed = match logging_config.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(filter_layer)
            .with(
                fmt::layer()
                    .event_format(OtelLineFormatter::new(logging_config))
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        // "console" and anything unrecognised
        _ => tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|_| LoggingError::AlreadyInitialized)
}
