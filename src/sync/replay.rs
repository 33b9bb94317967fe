//! Event-log replay.
//!
//! Applies logged change events to the replica one by one, in arrival order,
//! as targeted copies and deletions. This is far cheaper than a full tree
//! pass when only a handful of paths changed since the last tick.

use std::{
    fs::metadata,
    io::ErrorKind::NotFound,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    error::SyncError,
    sync::{
        event::{ChangeEvent, ChangeKind},
        fs_ops::remove_entry,
        outcome::SyncReport,
        tree::TreeReconciler,
    },
};

/// Re-roots a source path under the replica root.
///
/// # Errors
///
/// Returns `SyncError::OutsideRoot` if `path` is not under `source_root`.
pub fn rebase(path: &Path, source_root: &Path, replica_root: &Path) -> Result<PathBuf, SyncError> {
    let relative = path
        .strip_prefix(source_root)
        .map_err(|_| SyncError::OutsideRoot {
            path: path.to_path_buf(),
            root: source_root.to_path_buf(),
        })?;
    Ok(replica_root.join(relative))
}

/// Replays change events against the replica.
#[derive(Debug, Clone, Default)]
pub struct LogReconciler {
    /// Used for file-level change detection and to populate directories
    /// that appear in the source with contents already inside.
    tree: TreeReconciler,
}

impl LogReconciler {
    /// Creates a new log reconciler.
    #[must_use]
    pub fn new(tree: TreeReconciler) -> Self {
        Self { tree }
    }

    /// Gets the tree reconciler used for directory population.
    #[must_use]
    pub fn tree(&self) -> &TreeReconciler {
        &self.tree
    }

    /// Applies `events` in order.
    ///
    /// # Arguments
    ///
    /// * `events` - Ordered events, as drained from the event log.
    /// * `source_root` - Watched source root the event paths live under.
    /// * `replica_root` - Replica root the paths are re-rooted onto.
    ///
    /// # Returns
    ///
    /// The report of every operation attempted. Per-item failures never stop
    /// the remaining replay.
    pub fn replay(&self, events: &[ChangeEvent], source_root: &Path, replica_root: &Path) -> SyncReport {
        let mut report = SyncReport::default();
        for event in events {
            self.apply(event, source_root, replica_root, &mut report);
        }
        report
    }

    fn apply(&self, event: &ChangeEvent, source_root: &Path, replica_root: &Path, report: &mut SyncReport) {
        let replica = match rebase(&event.path, source_root, replica_root) {
            Ok(replica) => replica,
            Err(cause) => {
                report.failed(cause);
                return;
            }
        };

        match event.kind {
            ChangeKind::Deleted => {
                if replica == replica_root {
                    // The tree pass decides what an emptied source root means.
                    warn!("Ignoring deletion event for the source root {:?}", event.path);
                    return;
                }
                match remove_entry(&replica) {
                    Ok(Some(operation)) => report.applied(operation),
                    Ok(None) => debug!("Already absent in replica: {:?}", replica),
                    Err(cause) => report.failed(cause),
                }
            }
            ChangeKind::Created | ChangeKind::Modified | ChangeKind::Moved => {
                self.apply_upsert(&event.path, &replica, report);
            }
        }
    }

    fn apply_upsert(&self, source: &Path, replica: &Path, report: &mut SyncReport) {
        let source_metadata = match metadata(source) {
            Ok(source_metadata) => source_metadata,
            Err(e) if e.kind() == NotFound => {
                // Gone again before replay; its own deletion event follows.
                debug!("Source no longer exists, skipping: {:?}", source);
                return;
            }
            Err(source_error) => {
                report.failed(SyncError::Metadata {
                    path: source.to_path_buf(),
                    source: source_error,
                });
                return;
            }
        };

        if source_metadata.is_dir() {
            // A directory the replica lacks may have arrived with contents
            // (moved in, extracted, copied) that produce no per-file events.
            if !replica.is_dir() {
                self.tree.reconcile_into(source, replica, report);
            }
            return;
        }

        if let Some(parent) = replica.parent()
            && !parent.is_dir()
            && !self.tree.prepare_dir(parent, report)
        {
            return;
        }
        self.tree.sync_file(source, replica, report);
    }
}
