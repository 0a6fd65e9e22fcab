//! Logging setup, powered by tracing-subscriber.
//!
//! Logs go to stderr so answers printed on stdout stay clean.

use crate::types::{Result, RetrieverError};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Log format type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact text format: timestamp LEVEL target - message
    Compact,
    /// JSON Lines format for structured logging
    Json,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Build the filter: `RUST_LOG` when set, otherwise `level` with noisy HTTP crates quieted.
fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directives = [level, "hyper=warn", "reqwest=warn", "h2=warn", "rustls=warn"].join(",");
    EnvFilter::try_new(&directives)
        .map_err(|e| RetrieverError::ConfigError(format!("Invalid tracing filter '{}': {}", directives, e)))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns `RetrieverError::ConfigError` if the level is not a valid filter or
/// a subscriber is already installed
pub fn init_logging(format: LogFormat, level: &str) -> Result<()> {
    let filter = build_env_filter(level)?;

    let installed = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .compact()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    installed.map_err(|e| RetrieverError::ConfigError(format!("Failed to install logger: {}", e)))
}
