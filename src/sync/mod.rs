//! One-way synchronization engine.
//!
//! This module provides change detection, the two reconciliation strategies
//! (full tree pass and event-log replay), and the event backlog they share
//! with the watch subscription.

use std::path::{Path, PathBuf};

pub mod event;
pub mod event_log;
pub mod fingerprint;
pub mod fs_ops;
pub mod outcome;
pub mod replay;
pub mod tree;


pub use {
    event::{ChangeEvent, ChangeKind, WatchNotification},
    event_log::{EventLog, read_journal},
    fingerprint::{ContentFingerprinter, FileFingerprint},
    outcome::{Operation, ReconciliationOutcome, SyncReport},
    replay::LogReconciler,
    tree::TreeReconciler,
};

/// The source and replica roots, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPair {
    source_root: PathBuf,
    replica_root: PathBuf,
}

impl SyncPair {
    /// Creates a new pair. Both roots should be absolute so that watch
    /// notification paths can be re-rooted.
    pub fn new(source_root: impl Into<PathBuf>, replica_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            replica_root: replica_root.into(),
        }
    }

    /// Authoritative source root.
    #[must_use]
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Replica root.
    #[must_use]
    pub fn replica_root(&self) -> &Path {
        &self.replica_root
    }
}
