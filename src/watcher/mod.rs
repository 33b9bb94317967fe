//! Source tree change detection using the `notify` crate.
//!
//! This module provides the watch subscription: backend events are mapped to
//! change events at the callback and appended straight to the shared event
//! log, in the order the backend delivers them. Moves are decomposed here,
//! at the producer boundary, never inside the reconcilers.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    async_channel::Sender,
    notify::{
        Config, Error, Event, PollWatcher, RecommendedWatcher,
        RecursiveMode::Recursive,
        Watcher,
    },
    tracing::{debug, error, warn},
};

use crate::{error::WatchError, sync::EventLog};

mod config;
mod events;

pub use {
    config::FileWatcherConfig,
    events::{RenamePairing, WatchSignal, notifications_from},
};

/// Recursive watch subscription feeding an [`EventLog`].
///
/// Dropping the watcher ends notification delivery.
pub struct FileWatcher {
    /// Backend watcher, native or polling.
    watcher: Box<dyn Watcher + Send>,
    /// Set of currently watched roots.
    watched_paths: HashSet<PathBuf>,
    /// Configuration for watcher behavior.
    config: FileWatcherConfig,
}

impl FileWatcher {
    /// Creates a new file watcher.
    ///
    /// # Arguments
    ///
    /// * `event_log` - Backlog that receives every change event.
    /// * `signals` - Channel for rescan signals to the scheduler.
    /// * `config` - Optional configuration (uses defaults if None).
    ///
    /// # Returns
    ///
    /// A `Result` containing the `FileWatcher` or a `WatchError`.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Init` if the backend cannot be initialized.
    pub fn new(
        event_log: Arc<EventLog>,
        signals: Sender<WatchSignal>,
        config: Option<FileWatcherConfig>,
    ) -> Result<Self, WatchError> {
        let config = config.unwrap_or_default();

        let mut pairing = RenamePairing::default();
        let handler = move |res: Result<Event, Error>| {
            Self::handle_raw_event(res, &mut pairing, &event_log, &signals);
        };

        let watcher: Box<dyn Watcher + Send> = if config.use_polling {
            let backend_config = Config::default().with_poll_interval(config.poll_interval);
            Box::new(PollWatcher::new(handler, backend_config).map_err(WatchError::Init)?)
        } else {
            Box::new(RecommendedWatcher::new(handler, Config::default()).map_err(WatchError::Init)?)
        };

        Ok(Self {
            watcher,
            watched_paths: HashSet::new(),
            config,
        })
    }

    /// Handles raw events from the notify backend.
    ///
    /// Runs on the backend's notification thread, concurrently with the
    /// scheduler loop.
    fn handle_raw_event(
        res: Result<Event, Error>,
        pairing: &mut RenamePairing,
        event_log: &EventLog,
        signals: &Sender<WatchSignal>,
    ) {
        match res {
            Ok(event) => {
                debug!("Raw file system event: {:?}", event);

                if event.need_rescan() {
                    warn!("Watch backend dropped notifications, requesting a full pass");
                    Self::send_signal(
                        signals,
                        WatchSignal::RescanRequired {
                            reason: "backend dropped notifications".to_string(),
                        },
                    );
                }

                event_log.extend(pairing.events(&event));
            }
            Err(e) => {
                error!("File system watcher error: {}", e);
                Self::send_signal(
                    signals,
                    WatchSignal::RescanRequired {
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    fn send_signal(signals: &Sender<WatchSignal>, signal: WatchSignal) {
        // A full channel already holds a pending rescan request.
        if let Err(e) = signals.try_send(signal)
            && e.is_closed()
        {
            debug!("Scheduler no longer listening for watch signals");
        }
    }

    /// Starts watching a directory recursively.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Watch` if the directory cannot be watched.
    pub fn watch<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WatchError> {
        let path = path.as_ref();

        self.watcher
            .watch(path, Recursive)
            .map_err(|source| WatchError::Watch {
                path: path.to_path_buf(),
                source,
            })?;
        self.watched_paths.insert(path.to_path_buf());

        debug!("Started watching directory: {:?}", path);
        Ok(())
    }

    /// Stops watching a directory.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::Unwatch` if the directory cannot be unwatched.
    pub fn unwatch<P: AsRef<Path>>(&mut self, path: P) -> Result<(), WatchError> {
        let path = path.as_ref();

        self.watched_paths.remove(path);
        self.watcher
            .unwatch(path)
            .map_err(|source| WatchError::Unwatch {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("Stopped watching directory: {:?}", path);
        Ok(())
    }

    /// Stops watching every directory, logging failures.
    pub fn unwatch_all(&mut self) {
        let paths: Vec<PathBuf> = self.watched_paths.iter().cloned().collect();
        for path in paths {
            if let Err(e) = self.unwatch(&path) {
                warn!("{}", e);
            }
        }
    }

    /// Whether `path` is currently watched.
    #[must_use]
    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched_paths.contains(path)
    }

    /// Gets the current configuration.
    #[must_use]
    pub fn config(&self) -> &FileWatcherConfig {
        &self.config
    }
}
