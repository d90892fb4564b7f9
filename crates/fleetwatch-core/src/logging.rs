//! Logging infrastructure for FLEETWATCH.
//!
//! Structured logging using the `tracing` ecosystem. The dashboard keeps its
//! own log file so that connection drops and command history can be
//! inspected after the fact.
//!
//! ## Features
//!
//! - JSON lines format for machine parsing
//! - File output to `~/.fleetwatch/logs/fleetwatch.log` (rotated daily)
//! - Console output with configurable verbosity
//!
//! ## Example
//!
//! ```no_run
//! use fleetwatch_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("FLEETWATCH started");
//! tracing::debug!(agent_id = "scout-1", "agent update");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{FleetError, Result};

/// Log file name inside the log directory.
pub const LOG_FILE_NAME: &str = "fleetwatch.log";

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the FLEETWATCH logging system.
///
/// This sets up:
/// - File logging to `<log_dir>/fleetwatch.log` (JSON lines format)
/// - Console logging to stderr (human-readable format)
///
/// `RUST_LOG` takes precedence over the `verbose` flag when set.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| FleetError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_NAME);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "fleetwatch={default_level},fleetwatch_core={default_level},fleetwatch_client={default_level}"
        ))
    });

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for testing.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Base directory for FLEETWATCH state: `~/.fleetwatch/`.
pub fn fleetwatch_home() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FleetError::internal("home directory could not be determined"))?;

    Ok(home.join(".fleetwatch"))
}

/// Get the default log directory path: `~/.fleetwatch/logs/`.
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(fleetwatch_home()?.join("logs"))
}

/// Get the default log file path: `~/.fleetwatch/logs/fleetwatch.log`.
pub fn default_log_file() -> Result<PathBuf> {
    Ok(default_log_dir()?.join(LOG_FILE_NAME))
}

/// Log a realtime connection event.
///
/// # Example
///
/// ```ignore
/// log_connection_event!("open");
/// log_connection_event!("retry", attempt = 2, delay_ms = 2000);
/// ```
#[macro_export]
macro_rules! log_connection_event {
    ($event:expr) => {
        tracing::info!(
            target: "fleetwatch::connection",
            event = $event,
            "connection event"
        )
    };
    ($event:expr, $($field:tt)*) => {
        tracing::info!(
            target: "fleetwatch::connection",
            event = $event,
            $($field)*,
            "connection event"
        )
    };
}

/// Log an operator command submission or its outcome.
///
/// # Example
///
/// ```ignore
/// log_command!("sync", success = true);
/// log_command!("deploy", success = false, error = "unknown command");
/// ```
#[macro_export]
macro_rules! log_command {
    ($command:expr, $($field:tt)*) => {
        tracing::info!(
            target: "fleetwatch::command",
            command = $command,
            $($field)*,
            "operator command"
        )
    };
}
