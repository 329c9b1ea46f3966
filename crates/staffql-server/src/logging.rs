//! Structured logging for the staffql server
//!
//! - JSON output for production, pretty console output for development
//! - Daily rotated log files
//! - Per-request spans from the HTTP trace layer

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::Directive, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

const LOG_FILE_PREFIX: &str = "staffql-server.log";

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format for production (structured logging)
    Json,
    /// Compact format for testing
    Compact,
}

impl LogFormat {
    /// Parse from environment variable
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stdout only
    Stdout,
    /// Log to file only
    File,
    /// Log to both stdout and file
    Both,
}

impl LogOutput {
    /// Parse from environment variable
    pub fn from_env() -> Self {
        match std::env::var("LOG_OUTPUT").as_deref() {
            Ok("file") => LogOutput::File,
            Ok("both") => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }
}

/// Filter from `RUST_LOG` (default `info`) with chatty dependencies held at warn
fn env_filter() -> EnvFilter {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    ["hyper=warn", "h2=warn", "tower=warn", "reqwest=warn"]
        .iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(filter, |filter, directive| filter.add_directive(directive))
}

fn file_appender() -> RollingFileAppender {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    std::fs::create_dir_all(&log_dir).ok();
    RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX)
}

/// Initialize the logging system
///
/// Environment variables:
/// - `RUST_LOG`: Log level (e.g., "debug", "info", "staffql_server=debug")
/// - `LOG_FORMAT`: Output format ("pretty", "json", "compact")
/// - `LOG_OUTPUT`: Where to write logs ("stdout", "file", "both")
/// - `LOG_DIR`: Directory for log files (default: "./logs")
///
/// ```bash
/// # Production: JSON to file with info level
/// RUST_LOG=info LOG_FORMAT=json LOG_OUTPUT=file LOG_DIR=/var/log/staffql staffql-server
/// ```
pub fn init() {
    let format = LogFormat::from_env();
    let output = LogOutput::from_env();

    let stdout_layer = match output {
        LogOutput::File => None,
        LogOutput::Stdout | LogOutput::Both => Some(match format {
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_thread_ids(true)
                .with_target(true)
                .boxed(),
            LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
            LogFormat::Compact => fmt::layer().compact().boxed(),
        }),
    };

    let file_layer = match output {
        LogOutput::Stdout => None,
        LogOutput::File | LogOutput::Both => Some(
            fmt::layer()
                .with_writer(file_appender())
                .with_ansi(false)
                .boxed(),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer)
        .with(file_layer)
        .init();

    tracing::info!(format = ?format, output = ?output, "Logging initialized");
    if matches!(output, LogOutput::File | LogOutput::Both) {
        tracing::debug!(
            "LOG_DIR: {}",
            std::env::var("LOG_DIR").unwrap_or_else(|_| "not set".to_string())
        );
    }
}
