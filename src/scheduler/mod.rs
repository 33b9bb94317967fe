//! Periodic reconciliation loop.
//!
//! This module owns the watch subscription and decides, once per tick,
//! between replaying the event backlog and a full tree pass.
//!
//! ```text
//! Idle -> Watching -> {LogSync, TreeSync} -> Watching -> ... -> Stopped
//! ```

use std::{future::Future, pin::pin, sync::Arc};

use {
    async_channel::{Receiver, Sender, bounded},
    parking_lot::RwLock,
    tokio::{
        select,
        sync::broadcast::{Receiver as BroadcastReceiver, Sender as BroadcastSender, channel},
        task::spawn_blocking,
        time::sleep,
    },
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{SyncError, WatchError},
    logging::ACTIVITY_TARGET,
    sync::{
        ContentFingerprinter, EventLog, LogReconciler, SyncPair, SyncReport, TreeReconciler,
    },
    watcher::{FileWatcher, WatchSignal},
};

mod config;

pub use config::SchedulerConfig;

/// Lifecycle state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, not yet watching.
    Idle,
    /// Subscribed and waiting for the next tick.
    Watching,
    /// Running a full tree pass.
    TreeSync,
    /// Replaying the event backlog.
    LogSync,
    /// Subscription released; terminal.
    Stopped,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// Events replayed from the backlog.
    pub replayed_events: usize,
    /// Whether a full tree pass ran.
    pub full_pass: bool,
    /// Operations applied across both passes.
    pub applied: usize,
    /// Recorded per-item failures.
    pub failed: usize,
}

/// Events emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// The lifecycle state changed.
    StateChanged(SchedulerState),
    /// A reconciliation tick finished.
    TickCompleted(TickSummary),
}

/// Drives the periodic reconciliation loop.
pub struct SyncScheduler {
    /// Source and replica roots.
    pair: SyncPair,
    /// Configuration.
    config: SchedulerConfig,
    /// Backlog shared with the watch subscription.
    event_log: Arc<EventLog>,
    /// Replay strategy; holds the tree strategy too.
    reconciler: Arc<LogReconciler>,
    /// Active watch subscription, if started.
    file_watcher: Option<FileWatcher>,
    /// Rescan signals from the watcher.
    signal_sender: Sender<WatchSignal>,
    signal_receiver: Receiver<WatchSignal>,
    /// The next tick must include a full tree pass.
    full_pass_pending: bool,
    /// Current lifecycle state.
    state: Arc<RwLock<SchedulerState>>,
    /// Event sender for scheduler notifications.
    event_sender: BroadcastSender<SchedulerEvent>,
}

impl SyncScheduler {
    /// Creates a new scheduler.
    ///
    /// # Arguments
    ///
    /// * `pair` - Source and replica roots.
    /// * `event_log` - Event backlog, shared with the watcher once started.
    /// * `config` - Optional scheduler configuration.
    ///
    /// # Returns
    ///
    /// A new `SyncScheduler` in the `Idle` state.
    pub fn new(pair: SyncPair, event_log: Arc<EventLog>, config: Option<SchedulerConfig>) -> Self {
        let config = config.unwrap_or_default();

        let tree = TreeReconciler::new(ContentFingerprinter::new(config.chunk_size));
        let (signal_sender, signal_receiver) =
            bounded(config.file_watcher_config.signal_capacity.max(1));
        let (event_sender, _) = channel(16);

        Self {
            pair,
            config,
            event_log,
            reconciler: Arc::new(LogReconciler::new(tree)),
            file_watcher: None,
            signal_sender,
            signal_receiver,
            full_pass_pending: false,
            state: Arc::new(RwLock::new(SchedulerState::Idle)),
            event_sender,
        }
    }

    /// Subscribe to scheduler events.
    pub fn subscribe(&self) -> BroadcastReceiver<SchedulerEvent> {
        self.event_sender.subscribe()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }

    /// Gets the current scheduler configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Gets the source and replica roots.
    #[must_use]
    pub fn pair(&self) -> &SyncPair {
        &self.pair
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.write() = state;
        let _ = self.event_sender.send(SchedulerEvent::StateChanged(state));
    }

    /// Clears the backlog and subscribes to the source tree.
    ///
    /// The first tick after starting always includes a full tree pass, since
    /// nothing was recorded while the process was not watching.
    ///
    /// # Errors
    ///
    /// Returns `WatchError` if the subscription cannot be established.
    pub fn start(&mut self) -> Result<(), WatchError> {
        self.event_log.clear();

        let mut file_watcher = FileWatcher::new(
            self.event_log.clone(),
            self.signal_sender.clone(),
            Some(self.config.file_watcher_config.clone()),
        )?;
        file_watcher.watch(self.pair.source_root())?;

        self.file_watcher = Some(file_watcher);
        self.full_pass_pending = true;
        self.set_state(SchedulerState::Watching);
        info!(
            "Watching {:?}, mirroring to {:?} every {:?}",
            self.pair.source_root(),
            self.pair.replica_root(),
            self.config.interval
        );
        Ok(())
    }

    /// Runs one reconciliation tick.
    ///
    /// A non-empty backlog is replayed and then consumed; an empty one falls
    /// back to a full tree pass. A rescan signal from the watcher adds a tree
    /// pass after the replay, because the backlog is known to be incomplete.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::TaskFailed` if a reconciliation task panicked. The
    /// backlog is then left in place for the next tick.
    pub async fn tick(&mut self) -> Result<TickSummary, SyncError> {
        let resting_state = self.state();
        let result = self.run_passes().await;
        self.set_state(resting_state);

        let summary = result?;
        let _ = self
            .event_sender
            .send(SchedulerEvent::TickCompleted(summary.clone()));
        Ok(summary)
    }

    async fn run_passes(&mut self) -> Result<TickSummary, SyncError> {
        let events = self.event_log.drain();
        let replayed_events = events.len();

        let mut full_pass = std::mem::take(&mut self.full_pass_pending);
        while let Ok(WatchSignal::RescanRequired { reason }) = self.signal_receiver.try_recv() {
            warn!("Full pass required: {}", reason);
            full_pass = true;
        }

        let mut report = SyncReport::default();

        if replayed_events > 0 {
            self.set_state(SchedulerState::LogSync);
            info!(target: ACTIVITY_TARGET, "Synchronizing from log...");

            let reconciler = self.reconciler.clone();
            let pair = self.pair.clone();
            let replayed = spawn_blocking(move || {
                reconciler.replay(&events, pair.source_root(), pair.replica_root())
            })
            .await
            .map_err(|e| SyncError::TaskFailed {
                reason: e.to_string(),
            })?;

            self.event_log.consume(replayed_events);
            report.merge(replayed);
        }

        let full_pass = full_pass || replayed_events == 0;
        if full_pass {
            self.set_state(SchedulerState::TreeSync);
            info!(target: ACTIVITY_TARGET, "Synchronizing from source...");

            let reconciler = self.reconciler.clone();
            let pair = self.pair.clone();
            let reconciled = spawn_blocking(move || {
                reconciler
                    .tree()
                    .reconcile(pair.source_root(), pair.replica_root())
            })
            .await
            .map_err(|e| SyncError::TaskFailed {
                reason: e.to_string(),
            })?;

            report.merge(reconciled);
        }

        Ok(TickSummary {
            replayed_events,
            full_pass,
            applied: report.applied_count(),
            failed: report.failed_count(),
        })
    }

    /// Releases the watch subscription. Terminal.
    pub fn stop(&mut self) {
        if let Some(mut file_watcher) = self.file_watcher.take() {
            file_watcher.unwatch_all();
        }
        self.set_state(SchedulerState::Stopped);
        debug!("Scheduler stopped");
    }

    /// Starts watching and ticks every interval until `shutdown` resolves.
    ///
    /// Shutdown is cooperative: it is only observed between ticks, so an
    /// in-flight reconciliation always completes before the subscription is
    /// released.
    ///
    /// # Errors
    ///
    /// Returns `WatchError` if the subscription cannot be established.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), WatchError>
    where
        F: Future<Output = ()>,
    {
        self.start()?;
        let mut shutdown = pin!(shutdown);

        loop {
            match self.tick().await {
                Ok(summary) => debug!("Tick completed: {:?}", summary),
                Err(e) => error!("{}", e),
            }

            select! {
                _ = sleep(self.config.interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping watcher");
                    break;
                }
            }
        }

        self.stop();
        Ok(())
    }
}
