//! Logging setup for Herald applications.
//!
//! The dispatcher reports everything it does through `tracing` under the
//! [`DISPATCH_TARGET`] target, and wraps each dispatch in a `dispatch` span
//! (async units get a nested `async_handler` span). [`LoggingBuilder`] turns a
//! [`LoggingConfig`] into a `tracing-subscriber` pipeline that renders them.
//!
//! ```rust,ignore
//! use herald_runtime::prelude::*;
//!
//! let config = load_config()?;
//! init_from_config(&config.logging);
//!
//! // Or by hand: quiet application, chatty dispatcher.
//! LoggingBuilder::new()
//!     .level(LogLevel::Warn)
//!     .dispatch_level(LogLevel::Trace)
//!     .dispatch_spans()
//!     .init();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig};

/// Target of every event and span the dispatcher emits.
pub const DISPATCH_TARGET: &str = "herald::dispatch";

/// Installs the global subscriber described by `config`.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// Builds the global subscriber on top of a [`LoggingConfig`].
#[derive(Debug, Clone, Default)]
pub struct LoggingBuilder {
    config: LoggingConfig,
    dispatch_level: Option<LogLevel>,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            config: config.clone(),
            dispatch_level: None,
        }
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Sets the level of [`DISPATCH_TARGET`] independently of the global one.
    pub fn dispatch_level(mut self, level: LogLevel) -> Self {
        self.dispatch_level = Some(level);
        self
    }

    /// Sets the level of one module, e.g. `my_app::weather`.
    pub fn filter(mut self, module: impl Into<String>, level: LogLevel) -> Self {
        self.config.filters.insert(module.into(), level);
        self
    }

    /// Logs when each `dispatch` span opens and closes.
    pub fn dispatch_spans(mut self) -> Self {
        self.config.span_events.new = true;
        self.config.span_events.close = true;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    /// Writes to `path` instead of a terminal stream.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output = LogOutput::File;
        self.config.file_path = Some(path.into());
        self
    }

    /// Filter directives on top of the global level, in a stable order.
    ///
    /// An explicit [`dispatch_level`](Self::dispatch_level) overrides a
    /// `herald::dispatch` entry in the configured filters.
    fn directives(&self) -> Vec<String> {
        let mut filters: Vec<_> = self
            .config
            .filters
            .iter()
            .filter(|(module, _)| self.dispatch_level.is_none() || *module != DISPATCH_TARGET)
            .map(|(module, level)| format!("{module}={level}"))
            .collect();
        filters.sort();
        if let Some(level) = self.dispatch_level {
            filters.push(format!("{DISPATCH_TARGET}={level}"));
        }
        filters
    }

    /// `RUST_LOG` replaces the configured level; directives still apply.
    fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.level.as_str()));
        for directive in self.directives() {
            match directive.parse() {
                Ok(parsed) => filter = filter.add_directive(parsed),
                Err(err) => warn!(%directive, %err, "Ignoring invalid log directive"),
            }
        }
        filter
    }

    fn writer(&self) -> BoxMakeWriter {
        match (&self.config.output, &self.config.file_path) {
            (LogOutput::Stdout, _) => BoxMakeWriter::new(std::io::stdout),
            (LogOutput::Stderr, _) => BoxMakeWriter::new(std::io::stderr),
            (LogOutput::File, Some(path)) => BoxMakeWriter::new(tracing_appender::rolling::never(
                path.parent().unwrap_or_else(|| Path::new(".")),
                path.file_name().unwrap_or_else(|| OsStr::new("herald.log")),
            )),
            (LogOutput::File, None) => {
                warn!("File output requested without a file path, logging to stderr");
                BoxMakeWriter::new(std::io::stderr)
            }
        }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let config = &self.config;
        let spans = span_events(&config.span_events);
        let writer = self.writer();
        match config.format {
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_span_events(spans)
                .with_thread_ids(config.thread_ids)
                .with_file(config.file_location)
                .with_line_number(config.file_location)
                .with_writer(writer)
                .boxed(),
            LogFormat::Full => fmt::layer()
                .with_span_events(spans)
                .with_thread_ids(config.thread_ids)
                .with_file(config.file_location)
                .with_line_number(config.file_location)
                .with_writer(writer)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_span_events(spans)
                .with_thread_ids(config.thread_ids)
                .with_file(config.file_location)
                .with_line_number(config.file_location)
                .with_writer(writer)
                .boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => fmt::layer()
                .json()
                .with_span_events(spans)
                .with_writer(writer)
                .boxed(),
        }
    }

    pub fn init(self) {
        let _ = self.try_init();
    }

    pub fn try_init(self) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.layer())
            .with(self.env_filter())
            .try_init()
    }
}

fn span_events(config: &SpanEventConfig) -> FmtSpan {
    [
        (config.new, FmtSpan::NEW),
        (config.enter, FmtSpan::ENTER),
        (config.exit, FmtSpan::EXIT),
        (config.close, FmtSpan::CLOSE),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .fold(FmtSpan::NONE, |events, (_, event)| events | event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_spans_log_open_and_close() {
        let builder = LoggingBuilder::new().dispatch_spans();
        assert_eq!(
            span_events(&builder.config.span_events),
            FmtSpan::NEW | FmtSpan::CLOSE
        );
        assert_eq!(span_events(&SpanEventConfig::default()), FmtSpan::NONE);
    }

    #[test]
    fn test_directives_are_sorted() {
        let mut config = LoggingConfig {
            level: LogLevel::Warn,
            ..Default::default()
        };
        config.filters.insert("weather".to_string(), LogLevel::Debug);
        config
            .filters
            .insert(DISPATCH_TARGET.to_string(), LogLevel::Trace);

        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(
            builder.directives(),
            vec!["herald::dispatch=trace", "weather=debug"]
        );
    }

    #[test]
    fn test_dispatch_level_overrides_configured_filter() {
        let builder = LoggingBuilder::new()
            .filter(DISPATCH_TARGET, LogLevel::Error)
            .filter("counter", LogLevel::Info)
            .dispatch_level(LogLevel::Debug);

        assert_eq!(
            builder.directives(),
            vec!["counter=info", "herald::dispatch=debug"]
        );
    }

    #[test]
    fn test_file_selects_file_output() {
        let builder = LoggingBuilder::new().file("logs/herald.log");
        assert_eq!(builder.config.output, LogOutput::File);
        assert_eq!(
            builder.config.file_path.as_deref(),
            Some(Path::new("logs/herald.log"))
        );
    }
}
