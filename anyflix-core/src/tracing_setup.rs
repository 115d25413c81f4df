//! Tracing setup for Anyflix.
//!
//! Console output follows the level the user picked (or `RUST_LOG`), while a
//! second layer records everything at trace level into
//! `<logs_dir>/anyflix-last-run.log`, replaced on every run.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Name of the per-run trace log inside the logs directory.
pub const LAST_RUN_LOG: &str = "anyflix-last-run.log";

/// Installs the global subscriber and returns the trace log path.
///
/// # Errors
///
/// - `std::io::Error` - Logs directory or log file could not be created
/// - `TryInitError` - A global subscriber is already installed
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join(LAST_RUN_LOG);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(console_level)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        console = %console_level,
        trace_log = %log_file_path.display(),
        "tracing initialized"
    );

    Ok(log_file_path)
}

/// Console filter: chosen level for our crates, quieter for HTTP plumbing.
fn console_directives(level: Level) -> String {
    format!("{level},hyper=warn,tower_http=warn")
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Debug, informational, warning, and error messages
    Debug,
    /// All messages including detailed tracing
    Trace,
}

impl CliLogLevel {
    /// Maps the CLI level onto `tracing::Level`.
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_level_mapping() {
        assert_eq!(CliLogLevel::Warn.as_tracing_level(), Level::WARN);
        assert_eq!(CliLogLevel::Trace.as_tracing_level(), Level::TRACE);
    }

    #[test]
    fn test_console_directives_quiet_http_stack() {
        let directives = console_directives(Level::DEBUG);
        assert!(directives.starts_with("DEBUG"));
        assert!(directives.contains("hyper=warn"));
    }
}
