//! Mirror settings: paths, tick interval and time unit.
//!
//! Settings come either from command-line flags or from a JSON file, and are
//! validated once before the scheduler starts. Every error here is fatal.

use std::{
    fs::read_to_string,
    io::Error as StdError,
    path::{Path, PathBuf, absolute},
    str::FromStr,
    time::Duration,
};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Error as SerdeJsonError, from_str},
    thiserror::Error,
    tracing::debug,
};

use crate::sync::SyncPair;

/// Error type for settings operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the settings file.
    #[error("IO error: {0}")]
    IoError(#[from] StdError),
    /// Failed to deserialize settings.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] SerdeJsonError),
    /// The interval unit is not one of the supported names.
    #[error("Invalid time unit '{unit}'. Use 'seconds', 'minutes', or 'hours'.")]
    InvalidTimeUnit { unit: String },
    /// A path cannot be used for its purpose.
    #[error("Unusable path {path:?}: {reason}")]
    UnusablePath { path: PathBuf, reason: String },
    /// Invalid settings value.
    #[error("Invalid settings value: {reason}")]
    InvalidValue { reason: String },
}

/// Unit in which the tick interval is expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    /// Converts an interval expressed in this unit to seconds.
    #[must_use]
    pub fn to_seconds(self, interval: u64) -> u64 {
        match self {
            TimeUnit::Seconds => interval,
            TimeUnit::Minutes => interval.saturating_mul(60),
            TimeUnit::Hours => interval.saturating_mul(3600),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "seconds" => Ok(TimeUnit::Seconds),
            "minutes" => Ok(TimeUnit::Minutes),
            "hours" => Ok(TimeUnit::Hours),
            _ => Err(ConfigError::InvalidTimeUnit { unit: s.to_string() }),
        }
    }
}

/// Serializable mirror settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Authoritative source directory.
    pub source: PathBuf,
    /// Replica directory kept in sync with the source.
    pub replica: PathBuf,
    /// Activity log file.
    pub log_file: PathBuf,
    /// Tick interval, in `unit`s.
    pub interval: u64,
    /// Unit of `interval`.
    #[serde(default)]
    pub unit: TimeUnit,
    /// Optional plain-text journal mirroring the event backlog.
    #[serde(default)]
    pub event_journal: Option<PathBuf>,
}

impl SyncSettings {
    /// Loads settings from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Path to the settings file.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `SyncSettings` or a `ConfigError`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or is not valid JSON.
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_path = config_path.as_ref();
        debug!("Loading settings from file: {:?}", config_path);
        let contents = read_to_string(config_path)?;
        Ok(from_str(&contents)?)
    }

    /// Returns the tick interval converted to seconds.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.unit.to_seconds(self.interval))
    }

    /// Checks the settings before anything is started.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the source is not a directory, the interval is
    /// zero, the replica overlaps the source, or a log path is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.source.is_dir() {
            return Err(ConfigError::UnusablePath {
                path: self.source.clone(),
                reason: "source is not a directory".to_string(),
            });
        }

        if self.interval == 0 {
            return Err(ConfigError::InvalidValue {
                reason: "interval must be greater than zero".to_string(),
            });
        }

        let source = resolve(&self.source)?;
        let replica = resolve(&self.replica)?;
        if replica.starts_with(&source) {
            return Err(ConfigError::UnusablePath {
                path: self.replica.clone(),
                reason: "replica must not be the source or lie inside it".to_string(),
            });
        }

        // The tree pass would delete the source as an extra replica entry.
        if source.starts_with(&replica) {
            return Err(ConfigError::UnusablePath {
                path: self.source.clone(),
                reason: "source must not lie inside the replica".to_string(),
            });
        }

        // A log written inside the source would feed its own writes back as events.
        let log_paths = std::iter::once(&self.log_file).chain(self.event_journal.as_ref());
        for log_path in log_paths {
            if log_path.is_dir() {
                return Err(ConfigError::UnusablePath {
                    path: log_path.clone(),
                    reason: "log path is a directory".to_string(),
                });
            }
            if resolve(log_path)?.starts_with(&source) {
                return Err(ConfigError::UnusablePath {
                    path: log_path.clone(),
                    reason: "log file must not lie inside the source tree".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Builds the immutable source/replica pair with absolute roots.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if either root cannot be resolved.
    pub fn sync_pair(&self) -> Result<SyncPair, ConfigError> {
        Ok(SyncPair::new(resolve(&self.source)?, resolve(&self.replica)?))
    }
}

/// Resolves a path that may not exist yet.
///
/// The longest existing ancestor is canonicalized so that symlinked
/// prefixes compare equal to the paths the watch backend reports.
fn resolve(path: &Path) -> Result<PathBuf, ConfigError> {
    let path = absolute(path)?;
    let mut existing = path.as_path();
    let mut missing = Vec::new();

    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(path),
        }
    }

    let mut resolved = existing.canonicalize()?;
    resolved.extend(missing.into_iter().rev());
    Ok(resolved)
}
