//! Replisync - One-Way Directory Mirror
//!
//! Keeps a replica directory identical to a source directory. File system
//! notifications are recorded into an event backlog while the process runs,
//! and a periodic scheduler either replays that backlog or, when it is empty
//! or known to be incomplete, walks both trees and reconciles them by content.

pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod sync;
pub mod watcher;

// Re-export key types for convenience
pub use {
    config::{ConfigError, SyncSettings, TimeUnit},
    error::{SyncError, WatchError},
    scheduler::{SchedulerConfig, SchedulerEvent, SchedulerState, SyncScheduler, TickSummary},
    sync::{
        ChangeEvent, ChangeKind, ContentFingerprinter, EventLog, LogReconciler, SyncPair,
        SyncReport, TreeReconciler,
    },
    watcher::{FileWatcher, FileWatcherConfig},
};
