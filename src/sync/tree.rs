//! Full-tree reconciliation.
//!
//! The expensive correctness backstop: compares the source and replica trees
//! directory by directory and converges the replica. The walk is iterative,
//! driven by a stack of indices into an arena of directory nodes, and keeps
//! the top-down order: a directory's files are reconciled and its extra
//! entries removed before any of its subdirectories are entered.

use std::{
    collections::{BTreeMap, BTreeSet},
    ffi::OsString,
    fs::{canonicalize, read_dir, symlink_metadata},
    io::ErrorKind::NotFound,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    error::SyncError,
    sync::{
        fingerprint::ContentFingerprinter,
        fs_ops::{copy_file, create_dir_all, remove_entry},
        outcome::{Operation, SyncReport},
    },
};

/// Kind of a source entry, following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Directory,
    File,
}

/// A pair of directories still to be reconciled.
#[derive(Debug)]
struct DirNode {
    source: PathBuf,
    replica: PathBuf,
    /// Arena index of the enclosing directory.
    parent: Option<usize>,
    /// Resolved source path, used to detect symlink cycles.
    real: Option<PathBuf>,
}

impl DirNode {
    fn new(source: PathBuf, replica: PathBuf, parent: Option<usize>) -> Self {
        let real = canonicalize(&source).ok();
        Self {
            source,
            replica,
            parent,
            real,
        }
    }
}

/// Converges a replica directory tree to its source.
#[derive(Debug, Clone, Default)]
pub struct TreeReconciler {
    fingerprinter: ContentFingerprinter,
}

impl TreeReconciler {
    /// Creates a new tree reconciler.
    ///
    /// # Arguments
    ///
    /// * `fingerprinter` - Change detector shared with log replay.
    ///
    /// # Returns
    ///
    /// A new `TreeReconciler`.
    #[must_use]
    pub fn new(fingerprinter: ContentFingerprinter) -> Self {
        Self { fingerprinter }
    }

    /// Gets the fingerprinter used for change detection.
    #[must_use]
    pub fn fingerprinter(&self) -> &ContentFingerprinter {
        &self.fingerprinter
    }

    /// Reconciles `replica_dir` against `source_dir`, recursively.
    ///
    /// Per-item failures are recorded in the returned report and never stop
    /// the pass.
    pub fn reconcile<S: AsRef<Path>, R: AsRef<Path>>(
        &self,
        source_dir: S,
        replica_dir: R,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        self.reconcile_into(source_dir.as_ref(), replica_dir.as_ref(), &mut report);
        report
    }

    /// Same as [`reconcile`](Self::reconcile), recording into an existing report.
    pub(crate) fn reconcile_into(&self, source_dir: &Path, replica_dir: &Path, report: &mut SyncReport) {
        let mut arena = vec![DirNode::new(
            source_dir.to_path_buf(),
            replica_dir.to_path_buf(),
            None,
        )];
        let mut stack = vec![0usize];

        while let Some(index) = stack.pop() {
            if let Some(ancestor) = cycle_ancestor(&arena, index) {
                warn!(
                    "Skipping {:?}: symlink cycle back to {:?}",
                    arena[index].source, arena[ancestor].source
                );
                continue;
            }

            let children = self.reconcile_dir(index, &arena[index], report);

            // Reverse push so siblings are entered in name order.
            let first = arena.len();
            arena.extend(children);
            stack.extend((first..arena.len()).rev());
        }

        debug!(
            "Tree pass over {:?} visited {} directories",
            source_dir,
            arena.len()
        );
    }

    /// Reconciles one directory level and returns the subdirectory pairs to
    /// visit next.
    fn reconcile_dir(&self, index: usize, node: &DirNode, report: &mut SyncReport) -> Vec<DirNode> {
        if !self.prepare_dir(&node.replica, report) {
            return Vec::new();
        }

        let source_entries = match list_source(&node.source) {
            Ok(entries) => entries,
            Err(cause) => {
                // Without the source listing nothing here may be deleted.
                report.failed(cause);
                return Vec::new();
            }
        };
        let replica_names = match list_names(&node.replica) {
            Ok(names) => names,
            Err(cause) => {
                report.failed(cause);
                BTreeSet::new()
            }
        };

        let mut children = Vec::new();
        for (name, kind) in &source_entries {
            let source = node.source.join(name);
            let replica = node.replica.join(name);
            match kind {
                EntryKind::Directory => children.push(DirNode::new(source, replica, Some(index))),
                EntryKind::File => self.sync_file(&source, &replica, report),
            }
        }

        for name in replica_names
            .iter()
            .filter(|name| !source_entries.contains_key(*name))
        {
            match remove_entry(&node.replica.join(name)) {
                Ok(Some(operation)) => report.applied(operation),
                Ok(None) => {}
                Err(cause) => report.failed(cause),
            }
        }

        children
    }

    /// Makes sure `path` is a directory, creating it and any missing parents.
    /// A non-directory occupying the path is removed first.
    ///
    /// # Returns
    ///
    /// `true` if the directory is usable afterwards.
    pub(crate) fn prepare_dir(&self, path: &Path, report: &mut SyncReport) -> bool {
        match symlink_metadata(path) {
            Ok(metadata) if metadata.is_dir() => return true,
            Ok(_) => match remove_entry(path) {
                Ok(Some(operation)) => report.applied(operation),
                Ok(None) => {}
                Err(cause) => {
                    report.failed(cause);
                    return false;
                }
            },
            Err(e) if e.kind() == NotFound => {}
            Err(source) => {
                report.failed(SyncError::Metadata {
                    path: path.to_path_buf(),
                    source,
                });
                return false;
            }
        }

        match create_dir_all(path) {
            Ok(()) => {
                report.applied(Operation::CreateDir {
                    path: path.to_path_buf(),
                });
                true
            }
            Err(cause) => {
                report.failed(cause);
                false
            }
        }
    }

    /// Copies `source` to `replica` when the replica lacks a regular file
    /// there or the contents differ.
    pub(crate) fn sync_file(&self, source: &Path, replica: &Path, report: &mut SyncReport) {
        if replica.is_file() && self.fingerprinter.same_content(source, replica) {
            return;
        }

        match copy_file(source, replica) {
            Ok(()) => report.applied(Operation::Copy {
                from: source.to_path_buf(),
                to: replica.to_path_buf(),
            }),
            Err(cause) => report.failed(cause),
        }
    }
}

/// Finds an ancestor of the node at `index` that resolves to the same
/// source directory. Descending into it again would never terminate.
fn cycle_ancestor(arena: &[DirNode], index: usize) -> Option<usize> {
    let real = arena[index].real.as_ref()?;
    let mut current = arena[index].parent;

    while let Some(ancestor) = current {
        if arena[ancestor].real.as_ref() == Some(real) {
            return Some(ancestor);
        }
        current = arena[ancestor].parent;
    }
    None
}

/// Lists the entries directly under a source directory, in name order.
fn list_source(dir: &Path) -> Result<BTreeMap<OsString, EntryKind>, SyncError> {
    let entries = read_dir(dir).map_err(|source| SyncError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut listing = BTreeMap::new();
    for entry in entries.flatten() {
        let kind = if entry.path().is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        listing.insert(entry.file_name(), kind);
    }
    Ok(listing)
}

/// Lists the names directly under a replica directory.
fn list_names(dir: &Path) -> Result<BTreeSet<OsString>, SyncError> {
    let entries = read_dir(dir).map_err(|source| SyncError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(entries.flatten().map(|entry| entry.file_name()).collect())
}

#[cfg(test)]
mod tests {
    use std::fs::{create_dir_all, read_to_string, write};

    use tempfile::TempDir;

    use crate::sync::{
        outcome::Operation,
        tree::TreeReconciler,
    };

    #[test]
    fn test_creates_missing_replica_root() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let replica = temp_dir.path().join("deep/replica");
        create_dir_all(&source).unwrap();

        let report = TreeReconciler::default().reconcile(&source, &replica);
        assert!(replica.is_dir());
        assert_eq!(report.created_dirs(), 1);
        assert_eq!(report.failed_count(), 0);
    }

    #[test]
    fn test_entries_visited_in_name_order() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let replica = temp_dir.path().join("replica");
        create_dir_all(source.join("b")).unwrap();
        create_dir_all(source.join("a")).unwrap();
        write(source.join("z.txt"), "z").unwrap();
        write(source.join("y.txt"), "y").unwrap();
        write(source.join("a/inner.txt"), "i").unwrap();
        create_dir_all(&replica).unwrap();

        let report = TreeReconciler::default().reconcile(&source, &replica);
        let operations: Vec<_> = report.operations().cloned().collect();
        assert_eq!(
            operations,
            vec![
                Operation::Copy {
                    from: source.join("y.txt"),
                    to: replica.join("y.txt"),
                },
                Operation::Copy {
                    from: source.join("z.txt"),
                    to: replica.join("z.txt"),
                },
                Operation::CreateDir {
                    path: replica.join("a"),
                },
                Operation::Copy {
                    from: source.join("a/inner.txt"),
                    to: replica.join("a/inner.txt"),
                },
                Operation::CreateDir {
                    path: replica.join("b"),
                },
            ]
        );
    }

    #[test]
    fn test_kind_mismatch_is_replaced() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let replica = temp_dir.path().join("replica");
        create_dir_all(source.join("was_file")).unwrap();
        write(source.join("was_dir"), "now a file").unwrap();
        create_dir_all(replica.join("was_dir/nested")).unwrap();
        write(replica.join("was_file"), "now a dir").unwrap();

        let report = TreeReconciler::default().reconcile(&source, &replica);
        assert_eq!(report.failed_count(), 0);
        assert!(replica.join("was_file").is_dir());
        assert_eq!(read_to_string(replica.join("was_dir")).unwrap(), "now a file");
    }

    #[test]
    fn test_missing_source_is_recorded_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let replica = temp_dir.path().join("replica");
        create_dir_all(&replica).unwrap();
        write(replica.join("keep.txt"), "x").unwrap();

        let report =
            TreeReconciler::default().reconcile(temp_dir.path().join("absent"), &replica);
        assert_eq!(report.failed_count(), 1);
        // Nothing is deleted when the source cannot be listed.
        assert!(replica.join("keep.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_is_not_descended() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let replica = temp_dir.path().join("replica");
        create_dir_all(source.join("sub")).unwrap();
        write(source.join("f.txt"), "f").unwrap();
        symlink(&source, source.join("loop")).unwrap();
        symlink("..", source.join("sub/up")).unwrap();
        create_dir_all(temp_dir.path().join("outside")).unwrap();
        write(temp_dir.path().join("outside/o.txt"), "o").unwrap();
        symlink(temp_dir.path().join("outside"), source.join("linked")).unwrap();

        let report = TreeReconciler::default().reconcile(&source, &replica);
        assert_eq!(report.failed_count(), 0);
        assert_eq!(report.copied(), 2);
        assert_eq!(read_to_string(replica.join("f.txt")).unwrap(), "f");
        assert_eq!(read_to_string(replica.join("linked/o.txt")).unwrap(), "o");
        assert!(replica.join("sub").is_dir());
        assert!(!replica.join("loop").exists());
        assert!(!replica.join("sub/up").exists());

        // Skipped links leave nothing for later passes to do.
        let second = TreeReconciler::default().reconcile(&source, &replica);
        assert!(second.is_empty(), "second pass did: {:?}", second.outcomes());
    }
}
