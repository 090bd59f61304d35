//! Tracing subscriber setup for FERRY binaries.
//!
//! The library only emits `tracing` events; applications call
//! [`init_logging`] once at startup to print them.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt as layers, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors from logging setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file could not be opened.
    #[error("cannot open log file: {0}")]
    File(#[from] std::io::Error),

    /// A global subscriber is already installed.
    #[error("logging already initialised: {0}")]
    AlreadyInitialized(String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Unknown log format name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log format {0:?} (expected \"text\" or \"json\")")]
pub struct ParseLogFormatError(String);

impl FromStr for LogFormat {
    type Err = ParseLogFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ParseLogFormatError(s.to_string())),
        }
    }
}

/// Map a verbosity count to a level name.
///
/// 0=error, 1=warn, 2=info, 3=debug, 4+=trace.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the level derived from `verbosity`. Logs go to
/// stderr unless `log_file` is given, in which case they are appended to it.
///
/// # Example
///
/// ```ignore
/// use ferry_protocol::logging::{init_logging, LogFormat};
///
/// init_logging(2, None, LogFormat::Text)?;
/// ```
pub fn init_logging(
    verbosity: u8,
    log_file: Option<&Path>,
    format: LogFormat,
) -> Result<(), LoggingError> {
    let level = level_for(verbosity);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ferry={level},ferry_protocol={level}")));
    let detailed = verbosity >= 3;

    let result = match (log_file, format) {
        (None, LogFormat::Text) => tracing_subscriber::registry()
            .with(filter)
            .with(
                layers::layer()
                    .with_target(true)
                    .with_file(detailed)
                    .with_line_number(detailed),
            )
            .try_init(),
        (None, LogFormat::Json) => tracing_subscriber::registry()
            .with(filter)
            .with(layers::layer().json())
            .try_init(),
        (Some(path), LogFormat::Text) => {
            let file = open_append(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    layers::layer()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_target(true)
                        .with_file(detailed)
                        .with_line_number(detailed),
                )
                .try_init()
        }
        (Some(path), LogFormat::Json) => {
            let file = open_append(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(layers::layer().json().with_writer(file))
                .try_init()
        }
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}
