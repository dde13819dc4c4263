//! Tracing setup for atvboot
//!
//! Console output at the level the operator picks, plus an optional file
//! that captures everything at TRACE for the last run.

use std::fs::{File, create_dir_all};
use std::path::Path;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Name of the per-run debug log inside the logs directory.
pub const LAST_RUN_LOG: &str = "atvboot-last-run.log";

/// Console filter directives for a level; HTTP internals stay at warn.
pub fn console_directives(level: Level) -> String {
    let level = level.to_string().to_lowercase();
    format!("{level},hyper=warn,hyper_util=warn,rustls=warn,reqwest=warn")
}

/// Initialize tracing: console at `console_level`, and when `logs_dir` is
/// given, a full TRACE log at `<logs_dir>/atvboot-last-run.log`.
///
/// `RUST_LOG` overrides the console level when set.
///
/// # Errors
///
/// - `std::io::Error` - Logs directory cannot be created or log file cannot be opened
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> std::io::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(console_level)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let (file_layer, log_file_path) = match logs_dir {
        Some(dir) => {
            create_dir_all(dir)?;
            let path = dir.join(LAST_RUN_LOG);
            let log_file = File::create(&path)?;
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(log_file)
                .with_filter(EnvFilter::new("trace"));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    match log_file_path {
        Some(path) => tracing::info!(
            console = %console_level,
            debug_file = %path.display(),
            "Tracing initialized"
        ),
        None => tracing::info!(console = %console_level, "Tracing initialized"),
    }

    Ok(())
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    #[default]
    Info,
    /// Debug, informational, warning, and error messages
    Debug,
    /// All messages including detailed tracing
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use atvboot_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
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

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliLogLevel::Error => write!(f, "error"),
            CliLogLevel::Warn => write!(f, "warn"),
            CliLogLevel::Info => write!(f, "info"),
            CliLogLevel::Debug => write!(f, "debug"),
            CliLogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_level_mapping() {
        assert_eq!(CliLogLevel::Error.as_tracing_level(), Level::ERROR);
        assert_eq!(CliLogLevel::Trace.as_tracing_level(), Level::TRACE);
        assert_eq!(CliLogLevel::default(), CliLogLevel::Info);
    }

    #[test]
    fn test_console_directives_quiet_dependencies() {
        let directives = console_directives(Level::DEBUG);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("hyper=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
