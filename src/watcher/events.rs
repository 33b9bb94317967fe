//! Mapping of raw backend events to watch notifications.

use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

use {
    notify::{
        Event,
        event::{EventKind, ModifyKind, RenameMode},
    },
    tracing::debug,
};

use crate::sync::{ChangeEvent, ChangeKind, WatchNotification};

/// Rename cookies remembered per state before the oldest is forgotten.
const RENAME_MEMORY: usize = 64;

/// Out-of-band signal from the watcher to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// Notifications were dropped or the backend failed; the event log is
    /// known to be incomplete and a full tree pass is required.
    RescanRequired { reason: String },
}

/// Translates one backend event into notifications, in path order.
///
/// Renames are paired into a single move when the backend reports both
/// ends; a lone rename half is resolved by checking whether the path still
/// exists. Access events carry no change and are dropped.
pub fn notifications_from(event: &Event) -> Vec<WatchNotification> {
    let paths = &event.paths;

    match event.kind {
        EventKind::Create(_) => paths.iter().cloned().map(WatchNotification::Created).collect(),
        EventKind::Remove(_) => paths.iter().cloned().map(WatchNotification::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            vec![WatchNotification::Moved {
                from: paths[0].clone(),
                to: paths[1].clone(),
            }]
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.iter().cloned().map(WatchNotification::Deleted).collect()
        }
        // Arrived from outside the watched tree.
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().cloned().map(WatchNotification::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths.iter().map(|path| by_existence(path)).collect(),
        EventKind::Modify(_) => paths.iter().cloned().map(WatchNotification::Modified).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {
            debug!("Ignoring event kind {:?} for paths: {:?}", event.kind, paths);
            Vec::new()
        }
    }
}

/// Pairs rename halves that a backend delivers as separate events.
///
/// Some backends (inotify) report one rename as `Name(From)`, `Name(To)` and
/// then `Name(Both)`, all sharing a tracker cookie. The `From` half is
/// recorded as a deletion right away, since a move out of the watched tree
/// never gets a partner. A matching `To` half then becomes the `Moved` event,
/// and the trailing `Both` is dropped, so one rename yields exactly one
/// deletion and one move.
#[derive(Debug, Default)]
pub struct RenamePairing {
    /// Cookies whose `From` half was seen and whose `To` half was not.
    open: VecDeque<usize>,
    /// Cookies whose halves were both recorded.
    completed: VecDeque<usize>,
}

impl RenamePairing {
    /// Translates one backend event into change events for the log.
    pub fn events(&mut self, event: &Event) -> Vec<ChangeEvent> {
        let cookie = event.tracker();

        match (&event.kind, cookie) {
            (EventKind::Modify(ModifyKind::Name(RenameMode::From)), Some(cookie)) => {
                remember(&mut self.open, cookie);
            }
            (EventKind::Modify(ModifyKind::Name(RenameMode::To)), Some(cookie))
                if forget(&mut self.open, cookie) =>
            {
                remember(&mut self.completed, cookie);
                return event
                    .paths
                    .iter()
                    .map(|path| ChangeEvent::new(ChangeKind::Moved, path.clone()))
                    .collect();
            }
            (EventKind::Modify(ModifyKind::Name(RenameMode::Both)), Some(cookie))
                if forget(&mut self.completed, cookie) =>
            {
                debug!("Rename already recorded from its halves: {:?}", event.paths);
                return Vec::new();
            }
            _ => {}
        }

        notifications_from(event)
            .into_iter()
            .flat_map(WatchNotification::into_events)
            .collect()
    }
}

fn remember(cookies: &mut VecDeque<usize>, cookie: usize) {
    if cookies.len() == RENAME_MEMORY {
        cookies.pop_front();
    }
    cookies.push_back(cookie);
}

fn forget(cookies: &mut VecDeque<usize>, cookie: usize) -> bool {
    match cookies.iter().position(|&seen| seen == cookie) {
        Some(index) => {
            cookies.remove(index);
            true
        }
        None => false,
    }
}

fn by_existence(path: &Path) -> WatchNotification {
    let path: PathBuf = path.to_path_buf();
    if path.exists() {
        WatchNotification::Created(path)
    } else {
        WatchNotification::Deleted(path)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::write, path::PathBuf};

    use {
        notify::{
            Event,
            event::{AccessKind, CreateKind, DataChange, EventKind, ModifyKind, RemoveKind, RenameMode},
        },
        tempfile::TempDir,
    };

    use crate::{
        sync::{ChangeEvent, ChangeKind, WatchNotification},
        watcher::events::{RenamePairing, notifications_from},
    };

    #[test]
    fn test_basic_kinds() {
        let path = PathBuf::from("/src/a.txt");
        let test_cases = vec![
            (
                EventKind::Create(CreateKind::File),
                vec![WatchNotification::Created(path.clone())],
            ),
            (
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                vec![WatchNotification::Modified(path.clone())],
            ),
            (
                EventKind::Remove(RemoveKind::Any),
                vec![WatchNotification::Deleted(path.clone())],
            ),
            (EventKind::Access(AccessKind::Any), vec![]),
            (EventKind::Other, vec![]),
        ];

        for (kind, expected) in test_cases {
            let event = Event::new(kind).add_path(path.clone());
            assert_eq!(
                notifications_from(&event),
                expected,
                "Failed for kind: {:?}",
                event.kind
            );
        }
    }

    #[test]
    fn test_rename_pairs() {
        let both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/src/old"))
            .add_path(PathBuf::from("/src/new"));
        assert_eq!(
            notifications_from(&both),
            vec![WatchNotification::Moved {
                from: PathBuf::from("/src/old"),
                to: PathBuf::from("/src/new"),
            }]
        );

        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/src/old"));
        assert_eq!(
            notifications_from(&from),
            vec![WatchNotification::Deleted(PathBuf::from("/src/old"))]
        );

        let to = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(PathBuf::from("/src/new"));
        assert_eq!(
            notifications_from(&to),
            vec![WatchNotification::Created(PathBuf::from("/src/new"))]
        );
    }

    #[test]
    fn test_ambiguous_rename_resolved_by_existence() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("present");
        let absent = temp_dir.path().join("absent");
        write(&present, "x").unwrap();

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)))
            .add_path(absent.clone())
            .add_path(present.clone());
        assert_eq!(
            notifications_from(&event),
            vec![
                WatchNotification::Deleted(absent),
                WatchNotification::Created(present),
            ]
        );
    }

    #[test]
    fn test_rename_halves_pair_into_one_move() {
        let mut pairing = RenamePairing::default();
        let rename = |mode, paths: &[&str]| {
            paths.iter().fold(
                Event::new(EventKind::Modify(ModifyKind::Name(mode))).set_tracker(7),
                |event, path| event.add_path(PathBuf::from(path)),
            )
        };

        let mut events = pairing.events(&rename(RenameMode::From, &["/src/a"]));
        events.extend(pairing.events(&rename(RenameMode::To, &["/src/b"])));
        events.extend(pairing.events(&rename(RenameMode::Both, &["/src/a", "/src/b"])));

        assert_eq!(
            events,
            vec![
                ChangeEvent::new(ChangeKind::Deleted, "/src/a"),
                ChangeEvent::new(ChangeKind::Moved, "/src/b"),
            ]
        );
    }

    #[test]
    fn test_unpaired_rename_halves() {
        let mut pairing = RenamePairing::default();

        // Moved out of the watched tree: no partner ever arrives.
        let out = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .set_tracker(1)
            .add_path(PathBuf::from("/src/gone"));
        assert_eq!(
            pairing.events(&out),
            vec![ChangeEvent::new(ChangeKind::Deleted, "/src/gone")]
        );

        // Moved in from outside: a `To` with an unknown cookie is a creation.
        let arrived = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .set_tracker(2)
            .add_path(PathBuf::from("/src/new"));
        assert_eq!(
            pairing.events(&arrived),
            vec![ChangeEvent::new(ChangeKind::Created, "/src/new")]
        );

        // A `Both` without recorded halves carries the whole move.
        let both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .set_tracker(3)
            .add_path(PathBuf::from("/src/x"))
            .add_path(PathBuf::from("/src/y"));
        assert_eq!(
            pairing.events(&both),
            vec![
                ChangeEvent::new(ChangeKind::Deleted, "/src/x"),
                ChangeEvent::new(ChangeKind::Moved, "/src/y"),
            ]
        );
    }
}
