//! Activity log setup.
//!
//! Every copy, deletion, directory creation, and error, plus the strategy
//! chosen on each tick, is written as a timestamped line to the activity log
//! file and echoed to the terminal.

use std::{
    fs::{OpenOptions, create_dir_all},
    path::Path,
    sync::Arc,
};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::ConfigError;

/// Target used for per-item activity lines.
pub const ACTIVITY_TARGET: &str = "replisync::activity";

/// Installs the global subscriber writing to `log_file` and stdout.
///
/// The level comes from `RUST_LOG` when set, otherwise `debug` when `verbose`
/// and `info` when not.
///
/// # Errors
///
/// Returns `ConfigError::UnusablePath` if the log file cannot be opened, and
/// `ConfigError::InvalidValue` if a global subscriber is already installed.
pub fn init_activity_log(log_file: &Path, verbose: bool) -> Result<(), ConfigError> {
    let unusable = |e: std::io::Error| ConfigError::UnusablePath {
        path: log_file.to_path_buf(),
        reason: e.to_string(),
    };

    if let Some(parent) = log_file.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).map_err(unusable)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(unusable)?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = fmt::layer()
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_target(false);
    let stdout_layer = fmt::layer().compact().with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| ConfigError::InvalidValue {
            reason: format!("Failed to initialize logging: {e}"),
        })
}
