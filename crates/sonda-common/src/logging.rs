//! Logging infrastructure for Sonda
//!
//! Provides flexible logging with:
//! - stdout output by default (journalctl-friendly)
//! - Optional file output with daily rotation
//! - Environment-based log level configuration (`RUST_LOG`)

use std::path::PathBuf;
pub use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Optional log directory for file output
    pub log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Write to stderr instead of stdout. The worker binary reserves
    /// stdout for the control-channel event stream.
    pub use_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            level: "info".to_string(),
            use_stderr: false,
        }
    }
}

/// Initialize logging subsystem
///
/// # Examples
///
/// ```no_run
/// use sonda_common::logging::{init_logging, LogConfig};
///
/// // Default: stdout with info level
/// init_logging(LogConfig::default()).unwrap();
/// ```
pub fn init_logging(config: LogConfig) -> anyhow::Result<()> {
    // Build filter from config and RUST_LOG env var
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.log_dir {
        None if config.use_stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(true)
                        .with_thread_ids(false),
                )
                .init();
        }
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;

            let file_appender = tracing_appender::rolling::daily(dir, "probe.log");
            let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_ansi(false) // No ANSI colors in log files
                        .with_writer(non_blocking),
                )
                .init();
        }
    }

    Ok(())
}
