//! Domain-specific error types using `thiserror`.
//!
//! This module defines the error enums for the two runtime domains of the
//! mirror: per-item reconciliation failures and watch subscription failures.

use std::{io::Error as IoError, path::PathBuf};

use {notify::Error as NotifyError, thiserror::Error};

/// Recoverable failure of a single reconciliation step.
///
/// None of these abort a tick; they are recorded in the tick's report and
/// the item is retried naturally on the next tick.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Copying a file into the replica failed.
    #[error("Error copying {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: IoError,
    },
    /// Removing a file or directory from the replica failed.
    #[error("Error removing {path:?}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    /// Creating a replica directory failed.
    #[error("Error creating directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    /// Listing a directory failed.
    #[error("Error reading directory {path:?}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    /// Inspecting a path failed for a reason other than absence.
    #[error("Error reading metadata for {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: IoError,
    },
    /// A logged event names a path outside the watched source tree.
    #[error("Event path {path:?} is outside the source root {root:?}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
    /// The blocking reconciliation task panicked or was cancelled.
    #[error("Reconciliation task failed: {reason}")]
    TaskFailed { reason: String },
}

/// Watch subscription errors.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The notification backend could not be created.
    #[error("Failed to create file watcher: {0}")]
    Init(#[source] NotifyError),
    /// Subscribing to a directory failed.
    #[error("Failed to watch directory {path:?}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: NotifyError,
    },
    /// Unsubscribing from a directory failed.
    #[error("Failed to unwatch directory {path:?}: {source}")]
    Unwatch {
        path: PathBuf,
        #[source]
        source: NotifyError,
    },
}
