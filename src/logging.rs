//! Logging configuration and initialization for dropgate.
//!
//! Standard output carries the SCP protocol stream, so log lines go to
//! standard error or to an append-only sink file, never to stdout.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::{Dispatch, Level};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{GatewayError, Result};

/// Resolve a configured level name, including the `verbose` level and aliases.
pub fn resolve_level(level: &str) -> Option<Level> {
    match level.trim().to_lowercase().as_str() {
        "verbose" | "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warning" | "warn" => Some(Level::WARN),
        "error" | "err" => Some(Level::ERROR),
        _ => None,
    }
}

/// Parse log level string to tracing Level, defaulting to INFO.
fn parse_level(level: &str) -> Level {
    resolve_level(level).unwrap_or(Level::INFO)
}

/// Sink file path, or `None` for standard error.
fn sink_path(sink: &str) -> Option<&str> {
    let sink = sink.trim();
    if sink.is_empty() || sink.eq_ignore_ascii_case("stderr") || sink == "sys.stderr" {
        None
    } else {
        Some(sink)
    }
}

fn open_sink(path: &str) -> std::io::Result<fs::File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// A configured logging context.
///
/// Built once at process start and installed by the binary. Problems found
/// while building it (unknown level, unwritable sink) are held back and
/// logged once the subscriber is active.
pub struct Logger {
    dispatch: Dispatch,
    level: Level,
    deferred_warnings: Vec<String>,
}

impl Logger {
    /// Build the logging context from configuration.
    pub fn build(config: &LoggingConfig) -> Self {
        let mut deferred_warnings = Vec::new();

        let level = match resolve_level(&config.level) {
            Some(level) => level,
            None => {
                deferred_warnings.push(format!(
                    "unknown log level {:?}, defaulting to info",
                    config.level
                ));
                parse_level(&config.level)
            }
        };

        let writer = match sink_path(&config.sink) {
            Some(path) => match open_sink(path) {
                Ok(file) => BoxMakeWriter::new(Arc::new(file)),
                Err(e) => {
                    deferred_warnings.push(format!(
                        "cannot open log sink {path:?} ({e}), logging to stderr"
                    ));
                    BoxMakeWriter::new(std::io::stderr)
                }
            },
            None => BoxMakeWriter::new(std::io::stderr),
        };

        let filter = EnvFilter::from_default_env().add_directive(level.into());

        let subscriber = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(filter);

        Self {
            dispatch: Dispatch::new(subscriber),
            level,
            deferred_warnings,
        }
    }

    #[cfg(test)]
    fn level(&self) -> Level {
        self.level
    }

    /// Warnings collected while building the context.
    pub fn deferred_warnings(&self) -> &[String] {
        &self.deferred_warnings
    }

    #[cfg(test)]
    fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Install as the process-wide subscriber and flush deferred warnings.
    pub fn install(self) -> Result<()> {
        tracing::dispatcher::set_global_default(self.dispatch)
            .map_err(|e| GatewayError::Config(format!("logging already initialized: {e}")))?;
        tracing::debug!("Logging initialized (level: {})", self.level);
        for warning in &self.deferred_warnings {
            tracing::warn!("{}", warning);
        }
        Ok(())
    }
}

/// Initialize logging for a binary, falling back to stderr on failure.
pub fn init(config: &LoggingConfig) {
    if let Err(e) = Logger::build(config).install() {
        eprintln!("Failed to initialize logging: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(level: &str, sink: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            sink: sink.to_string(),
        }
    }

    #[test]
    fn test_resolve_level_names() {
        assert_eq!(resolve_level("error"), Some(Level::ERROR));
        assert_eq!(resolve_level("WARNING"), Some(Level::WARN));
        assert_eq!(resolve_level("info"), Some(Level::INFO));
        assert_eq!(resolve_level("Debug"), Some(Level::DEBUG));
        assert_eq!(resolve_level("verbose"), Some(Level::TRACE));
    }

    #[test]
    fn test_resolve_level_aliases() {
        assert_eq!(resolve_level("warn"), Some(Level::WARN));
        assert_eq!(resolve_level("ERR"), Some(Level::ERROR));
        assert_eq!(resolve_level("trace"), Some(Level::TRACE));
        assert_eq!(resolve_level(" info "), Some(Level::INFO));
    }

    #[test]
    fn test_parse_level_default() {
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_sink_path() {
        assert_eq!(sink_path(""), None);
        assert_eq!(sink_path("  "), None);
        assert_eq!(sink_path("stderr"), None);
        assert_eq!(sink_path("STDERR"), None);
        assert_eq!(sink_path("sys.stderr"), None);
        assert_eq!(sink_path("/var/log/x.log"), Some("/var/log/x.log"));
    }

    #[test]
    fn test_build_unknown_level_defers_warning() {
        let logger = Logger::build(&logging("loud", ""));
        assert_eq!(logger.level(), Level::INFO);
        assert_eq!(logger.deferred_warnings().len(), 1);
        assert!(logger.deferred_warnings()[0].contains("loud"));
    }

    #[test]
    fn test_build_known_level_has_no_warnings() {
        let logger = Logger::build(&logging("verbose", "stderr"));
        assert_eq!(logger.level(), Level::TRACE);
        assert!(logger.deferred_warnings().is_empty());
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("dropgate.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "existing line\n").unwrap();

        let logger = Logger::build(&logging("info", path.to_str().unwrap()));
        assert!(logger.deferred_warnings().is_empty());

        tracing::dispatcher::with_default(logger.dispatch(), || {
            tracing::info!("hello sink");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("existing line\n"));
        assert!(content.contains("hello sink"));
    }

    #[test]
    fn test_file_sink_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("d.log");

        let logger = Logger::build(&logging("info", path.to_str().unwrap()));
        assert!(logger.deferred_warnings().is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_unwritable_sink_falls_back_to_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        // A directory cannot be opened for appending.
        let logger = Logger::build(&logging("info", dir.path().to_str().unwrap()));
        assert_eq!(logger.deferred_warnings().len(), 1);
        assert!(logger.deferred_warnings()[0].contains("logging to stderr"));
    }
}
