//! Per-item reconciliation outcomes and their per-tick aggregate.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

use tracing::{error, info};

use crate::{error::SyncError, logging::ACTIVITY_TARGET};

/// A filesystem mutation applied to the replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// A source file was copied over the replica path.
    Copy { from: PathBuf, to: PathBuf },
    /// A replica file (or symlink) was removed.
    RemoveFile { path: PathBuf },
    /// A replica directory was removed with all its contents.
    RemoveDir { path: PathBuf },
    /// A replica directory was created.
    CreateDir { path: PathBuf },
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Operation::Copy { from, to } => {
                write!(f, "Copied: {} to {}", from.display(), to.display())
            }
            Operation::RemoveFile { path } => write!(f, "Removed file: {}", path.display()),
            Operation::RemoveDir { path } => write!(f, "Removed directory: {}", path.display()),
            Operation::CreateDir { path } => write!(f, "Created directory: {}", path.display()),
        }
    }
}

/// Result of a single copy, delete, or directory-create step.
#[derive(Debug)]
pub enum ReconciliationOutcome {
    Applied(Operation),
    Failed(SyncError),
}

/// Every outcome of one reconciliation pass, in the order they happened.
///
/// Recording an outcome also writes it to the activity log.
#[derive(Debug, Default)]
pub struct SyncReport {
    outcomes: Vec<ReconciliationOutcome>,
}

impl SyncReport {
    /// Records and logs a successful operation.
    pub fn applied(&mut self, operation: Operation) {
        info!(target: ACTIVITY_TARGET, "{}", operation);
        self.outcomes.push(ReconciliationOutcome::Applied(operation));
    }

    /// Records and logs a recoverable failure.
    pub fn failed(&mut self, cause: SyncError) {
        error!(target: ACTIVITY_TARGET, "{}", cause);
        self.outcomes.push(ReconciliationOutcome::Failed(cause));
    }

    /// All outcomes in order.
    #[must_use]
    pub fn outcomes(&self) -> &[ReconciliationOutcome] {
        &self.outcomes
    }

    /// Successfully applied operations, in order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            ReconciliationOutcome::Applied(operation) => Some(operation),
            ReconciliationOutcome::Failed(_) => None,
        })
    }

    /// Recorded failures, in order.
    pub fn failures(&self) -> impl Iterator<Item = &SyncError> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            ReconciliationOutcome::Failed(cause) => Some(cause),
            ReconciliationOutcome::Applied(_) => None,
        })
    }

    /// Number of files copied.
    #[must_use]
    pub fn copied(&self) -> usize {
        self.operations()
            .filter(|operation| matches!(operation, Operation::Copy { .. }))
            .count()
    }

    /// Number of files and directories removed.
    #[must_use]
    pub fn removed(&self) -> usize {
        self.operations()
            .filter(|operation| {
                matches!(
                    operation,
                    Operation::RemoveFile { .. } | Operation::RemoveDir { .. }
                )
            })
            .count()
    }

    /// Number of directories created.
    #[must_use]
    pub fn created_dirs(&self) -> usize {
        self.operations()
            .filter(|operation| matches!(operation, Operation::CreateDir { .. }))
            .count()
    }

    /// Number of applied operations.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.operations().count()
    }

    /// Number of failures.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// Whether the pass changed nothing and hit no failure.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Appends another report's outcomes after this one's.
    pub fn merge(&mut self, other: SyncReport) {
        self.outcomes.extend(other.outcomes);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Error, ErrorKind::NotFound},
        path::PathBuf,
    };

    use crate::{
        error::SyncError,
        sync::outcome::{Operation, SyncReport},
    };

    #[test]
    fn test_operation_display() {
        let copy = Operation::Copy {
            from: PathBuf::from("/src/foo.txt"),
            to: PathBuf::from("/dst/foo.txt"),
        };
        assert_eq!(copy.to_string(), "Copied: /src/foo.txt to /dst/foo.txt");

        let remove = Operation::RemoveDir {
            path: PathBuf::from("/dst/old"),
        };
        assert_eq!(remove.to_string(), "Removed directory: /dst/old");
    }

    #[test]
    fn test_report_counts() {
        let mut report = SyncReport::default();
        assert!(report.is_empty());

        report.applied(Operation::CreateDir {
            path: PathBuf::from("/dst"),
        });
        report.applied(Operation::Copy {
            from: PathBuf::from("/src/a"),
            to: PathBuf::from("/dst/a"),
        });
        report.applied(Operation::RemoveFile {
            path: PathBuf::from("/dst/b"),
        });
        report.failed(SyncError::Remove {
            path: PathBuf::from("/dst/c"),
            source: Error::new(NotFound, "gone"),
        });

        assert_eq!(report.created_dirs(), 1);
        assert_eq!(report.copied(), 1);
        assert_eq!(report.removed(), 1);
        assert_eq!(report.applied_count(), 3);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.outcomes().len(), 4);

        let mut total = SyncReport::default();
        total.merge(report);
        assert_eq!(total.applied_count(), 3);
    }
}
