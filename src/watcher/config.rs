//! Configuration for file watcher behavior.

use std::time::Duration;

/// Configuration for file watcher behavior.
#[derive(Debug, Clone)]
pub struct FileWatcherConfig {
    /// Use the portable polling backend instead of native notifications.
    ///
    /// Needed for network and FUSE filesystems that never deliver native events.
    pub use_polling: bool,
    /// Scan interval of the polling backend.
    pub poll_interval: Duration,
    /// Capacity of the channel carrying rescan signals to the scheduler.
    pub signal_capacity: usize,
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            use_polling: false,
            poll_interval: Duration::from_secs(2),
            signal_capacity: 16,
        }
    }
}
