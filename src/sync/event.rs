//! Change events recorded between reconciliation ticks.
//!
//! A raw watch notification is mapped to one or two `ChangeEvent`s at the
//! producer boundary: a move becomes a deletion of the old path immediately
//! followed by a `Moved` event that carries the new path and is replayed as a
//! creation. Each event has a one-line text form used by the event journal:
//!
//! ```text
//! Event type: <kind>: <path>
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    sync::LazyLock,
};

use regex::Regex;

/// Journal line pattern; matched anywhere in the line so prefixed lines parse.
static JOURNAL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Event type: (.+?): (.+)").expect("journal pattern is valid"));

/// Kind of change observed on the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    /// Arrival at a new path after a move; replayed like `Created`.
    Moved,
}

impl ChangeKind {
    /// Journal label of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Moved => "moved",
        }
    }

    /// Parses a journal label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "created" => Some(ChangeKind::Created),
            "modified" => Some(ChangeKind::Modified),
            "deleted" => Some(ChangeKind::Deleted),
            "moved" => Some(ChangeKind::Moved),
            _ => None,
        }
    }
}

impl Display for ChangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// One logged change: a kind and the absolute source path it affected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// Absolute path under the watched source tree.
    pub path: PathBuf,
}

impl ChangeEvent {
    /// Creates a new change event.
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Renders the event as a journal line, without the trailing newline.
    #[must_use]
    pub fn to_journal_line(&self) -> String {
        format!("Event type: {}: {}", self.kind, self.path.display())
    }

    /// Parses a journal line.
    ///
    /// # Returns
    ///
    /// The event, or `None` if the line is malformed or names an unknown kind.
    #[must_use]
    pub fn parse_journal_line(line: &str) -> Option<Self> {
        let captures = JOURNAL_LINE.captures(line.trim_end_matches(['\r', '\n']))?;
        let kind = ChangeKind::from_label(captures.get(1)?.as_str())?;
        Some(Self::new(kind, captures.get(2)?.as_str()))
    }
}

impl Display for ChangeEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.to_journal_line())
    }
}

/// A change notification as delivered by the watch subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchNotification {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

impl WatchNotification {
    /// Decomposes the notification into the events appended to the log.
    ///
    /// A move yields `Deleted(from)` immediately followed by `Moved(to)`.
    #[must_use]
    pub fn into_events(self) -> Vec<ChangeEvent> {
        match self {
            WatchNotification::Created(path) => vec![ChangeEvent::new(ChangeKind::Created, path)],
            WatchNotification::Modified(path) => {
                vec![ChangeEvent::new(ChangeKind::Modified, path)]
            }
            WatchNotification::Deleted(path) => vec![ChangeEvent::new(ChangeKind::Deleted, path)],
            WatchNotification::Moved { from, to } => vec![
                ChangeEvent::new(ChangeKind::Deleted, from),
                ChangeEvent::new(ChangeKind::Moved, to),
            ],
        }
    }
}
