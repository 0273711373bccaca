//! Logging setup for the plansmith binary.
//!
//! Logs go to stderr and to two daily-rolling files in the log directory:
//!
//! - `plansmith.<date>.log`: everything that passes the env filter
//! - `error.<date>.log`: warnings and errors only
//!
//! Stdout is left alone so generated artifacts can be piped.
//!
//! ```no_run
//! use plansmith::logging;
//!
//! # fn main() -> plansmith::error::Result<()> {
//! logging::init(&logging::get_log_dir(None)?)?;
//! tracing::info!("Ready");
//! # Ok(())
//! # }
//! ```

use crate::error::{PipelineError, Result, ResultExt as _};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

/// Resolve and create the log directory.
///
/// Uses `override_dir` when given, otherwise `<data_dir>/plansmith/logs`.
///
/// # Errors
///
/// Returns error if the directory cannot be determined or created.
pub fn get_log_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    let log_dir = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => crate::config::app_data_dir()?.join("logs"),
    };

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }

    Ok(log_dir)
}

fn appender(log_dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| PipelineError::Config(format!("Failed to create {prefix} log appender: {e}")))
}

/// Install the global subscriber.
///
/// Defaults to `info`; `RUST_LOG` overrides.
///
/// # Errors
///
/// Returns error if the file appenders or the filter cannot be created.
pub fn init(log_dir: &Path) -> Result<()> {
    let all_logs_appender = appender(log_dir, "plansmith")?;
    let error_logs_appender = appender(log_dir, "error")?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| PipelineError::Config(format!("Failed to create env filter: {e}")))?;

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_writer(std::io::stderr);

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_logs_appender);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(error_logs_appender)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .map_err(|e| PipelineError::Config(format!("Logging already initialized: {e}")))?;

    tracing::debug!("Logging initialized, log directory: {}", log_dir.display());

    Ok(())
}

/// Path of today's main log file.
pub fn current_log_path(log_dir: &Path) -> PathBuf {
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    log_dir.join(format!("plansmith.{today}.log"))
}
