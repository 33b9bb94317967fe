//! Ordered backlog of change events awaiting replay.
//!
//! The log is written from the watch notification context and read by the
//! scheduler loop; all access goes through a single mutex. Optionally the
//! backlog is mirrored to a plain-text journal, one line per event, which
//! operators can inspect and [`read_journal`] can parse back.

use std::{
    fs::{File, OpenOptions, create_dir_all},
    io::{BufRead, BufReader, Result as IoResult, Write},
    path::{Path, PathBuf},
};

use {
    parking_lot::Mutex,
    tracing::{debug, warn},
};

use crate::sync::event::ChangeEvent;

/// Append-only journal file mirroring the in-memory backlog.
#[derive(Debug)]
struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    fn append(&mut self, events: &[ChangeEvent]) {
        for event in events {
            if let Err(e) = writeln!(self.file, "{}", event.to_journal_line()) {
                warn!("Error writing event journal {:?}: {}", self.path, e);
                return;
            }
        }
    }

    fn rewrite(&mut self, events: &[ChangeEvent]) {
        // The file is opened in append mode, so writes after truncation land at 0.
        if let Err(e) = self.file.set_len(0) {
            warn!("Error truncating event journal {:?}: {}", self.path, e);
            return;
        }
        self.append(events);
    }
}

#[derive(Debug, Default)]
struct Inner {
    events: Vec<ChangeEvent>,
    journal: Option<Journal>,
}

/// Mutex-guarded, ordered event backlog.
#[derive(Debug, Default)]
pub struct EventLog {
    inner: Mutex<Inner>,
}

impl EventLog {
    /// Creates an empty log with no journal.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Creates an empty log mirrored to a journal file.
    ///
    /// The journal is truncated on open: the backlog always starts empty and
    /// the first tick's full tree pass covers anything missed while stopped.
    ///
    /// # Arguments
    ///
    /// * `path` - Journal file path; parent directories are created.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `EventLog` or an I/O error.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be created or truncated.
    pub fn with_journal<P: AsRef<Path>>(path: P) -> IoResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.set_len(0)?;
        debug!("Event journal opened at {:?}", path);

        Ok(Self {
            inner: Mutex::new(Inner {
                events: Vec::new(),
                journal: Some(Journal { path, file }),
            }),
        })
    }

    /// Appends one event.
    pub fn append(&self, event: ChangeEvent) {
        self.extend(vec![event]);
    }

    /// Appends several events as one contiguous run.
    ///
    /// A decomposed move is appended this way so that its `Deleted` and
    /// `Moved` halves are never split by a concurrent append.
    pub fn extend(&self, events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        if let Some(journal) = inner.journal.as_mut() {
            journal.append(&events);
        }
        inner.events.extend(events);
    }

    /// Returns every recorded event in append order without removing any.
    #[must_use]
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.inner.lock().events.clone()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Whether the backlog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    /// Truncates the log to empty.
    pub fn clear(&self) {
        self.consume(usize::MAX);
    }

    /// Removes the first `count` events, which a replay pass has handled.
    ///
    /// Events appended after the matching [`drain`](Self::drain) stay queued
    /// for the next tick.
    pub fn consume(&self, count: usize) {
        let mut inner = self.inner.lock();
        let count = count.min(inner.events.len());
        inner.events.drain(..count);

        let Inner { events, journal } = &mut *inner;
        if let Some(journal) = journal.as_mut() {
            journal.rewrite(events);
        }
    }

    /// Path of the journal file, if one is configured.
    #[must_use]
    pub fn journal_path(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .journal
            .as_ref()
            .map(|journal| journal.path.clone())
    }
}

/// Parses an event journal back into events, in file order.
///
/// Malformed lines are skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn read_journal<P: AsRef<Path>>(path: P) -> IoResult<Vec<ChangeEvent>> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();

    for line in reader.lines() {
        let line = line?;
        match ChangeEvent::parse_journal_line(&line) {
            Some(event) => events.push(event),
            None => debug!("Skipping malformed event journal line: {:?}", line),
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{read_to_string, write},
        sync::Arc,
        thread,
    };

    use tempfile::TempDir;

    use crate::sync::{
        event::{ChangeEvent, ChangeKind, WatchNotification},
        event_log::{EventLog, read_journal},
    };

    #[test]
    fn test_append_drain_clear() {
        let log = EventLog::in_memory();
        assert!(log.is_empty());

        log.append(ChangeEvent::new(ChangeKind::Created, "/src/a"));
        log.append(ChangeEvent::new(ChangeKind::Modified, "/src/a"));

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind, ChangeKind::Created);
        assert_eq!(drained[1].kind, ChangeKind::Modified);

        // Draining does not remove anything.
        assert_eq!(log.len(), 2);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_consume_keeps_late_events() {
        let log = EventLog::in_memory();
        log.append(ChangeEvent::new(ChangeKind::Created, "/src/a"));
        let drained = log.drain();

        log.append(ChangeEvent::new(ChangeKind::Deleted, "/src/b"));
        log.consume(drained.len());

        assert_eq!(log.drain(), vec![ChangeEvent::new(ChangeKind::Deleted, "/src/b")]);
    }

    #[test]
    fn test_journal_mirrors_backlog() {
        let temp_dir = TempDir::new().unwrap();
        let journal = temp_dir.path().join("logs").join("source.log");

        let log = EventLog::with_journal(&journal).unwrap();
        assert_eq!(log.journal_path(), Some(journal.clone()));

        log.extend(
            WatchNotification::Moved {
                from: "/src/a".into(),
                to: "/src/b".into(),
            }
            .into_events(),
        );
        assert_eq!(
            read_to_string(&journal).unwrap(),
            "Event type: deleted: /src/a\nEvent type: moved: /src/b\n"
        );
        assert_eq!(read_journal(&journal).unwrap(), log.drain());

        log.consume(1);
        assert_eq!(
            read_to_string(&journal).unwrap(),
            "Event type: moved: /src/b\n"
        );

        log.clear();
        assert_eq!(read_to_string(&journal).unwrap(), "");
    }

    #[test]
    fn test_journal_truncated_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let journal = temp_dir.path().join("source.log");
        write(&journal, "Event type: created: /src/stale\n").unwrap();

        let log = EventLog::with_journal(&journal).unwrap();
        assert!(log.is_empty());
        assert_eq!(read_to_string(&journal).unwrap(), "");
    }

    #[test]
    fn test_read_journal_skips_malformed_lines() {
        let temp_dir = TempDir::new().unwrap();
        let journal = temp_dir.path().join("source.log");
        write(
            &journal,
            "Event type: created: /src/a\nnot an event\nEvent type: exploded: /src/x\nEvent type: deleted: /src/a\n",
        )
        .unwrap();

        assert_eq!(
            read_journal(&journal).unwrap(),
            vec![
                ChangeEvent::new(ChangeKind::Created, "/src/a"),
                ChangeEvent::new(ChangeKind::Deleted, "/src/a"),
            ]
        );
    }

    #[test]
    fn test_concurrent_appends_keep_move_pairs_adjacent() {
        let log = Arc::new(EventLog::in_memory());
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let log = log.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        log.extend(
                            WatchNotification::Moved {
                                from: format!("/src/{worker}-{i}").into(),
                                to: format!("/src/{worker}-{i}.moved").into(),
                            }
                            .into_events(),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let events = log.drain();
        assert_eq!(events.len(), 800);
        for pair in events.chunks(2) {
            assert_eq!(pair[0].kind, ChangeKind::Deleted);
            assert_eq!(pair[1].kind, ChangeKind::Moved);
            assert_eq!(pair[1].path, pair[0].path.with_extension("moved"));
        }
    }
}
