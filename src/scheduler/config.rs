//! Configuration for the reconciliation loop.

use std::time::Duration;

use crate::{sync::fingerprint::DEFAULT_CHUNK_SIZE, watcher::FileWatcherConfig};

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between the end of one tick and the start of the next.
    pub interval: Duration,
    /// Read size used when fingerprinting files.
    pub chunk_size: usize,
    /// File watcher configuration.
    pub file_watcher_config: FileWatcherConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            chunk_size: DEFAULT_CHUNK_SIZE,
            file_watcher_config: FileWatcherConfig::default(),
        }
    }
}
