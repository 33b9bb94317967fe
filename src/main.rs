//! Replisync - One-Way Directory Mirror
//!
//! This is the main entry point for the replisync command-line tool.
//! It validates the settings, sets up activity logging and runs the
//! synchronization scheduler until Ctrl-C is pressed.

use std::{future::pending, path::PathBuf, sync::Arc};

use {
    anyhow::{Context, Result, bail},
    clap::Parser,
    tokio::{signal::ctrl_c, spawn, sync::oneshot},
    tracing::{error, info},
};

use replisync::{
    EventLog, FileWatcherConfig, SchedulerConfig, SyncScheduler, SyncSettings, TimeUnit,
    logging::init_activity_log,
};

/// Keep a replica directory identical to a source directory.
#[derive(Parser, Debug)]
#[command(name = "replisync", version, about)]
struct Cli {
    /// Source directory to mirror.
    #[arg(required_unless_present = "config")]
    source: Option<PathBuf>,

    /// Replica directory to keep in sync.
    #[arg(required_unless_present = "config")]
    replica: Option<PathBuf>,

    /// Activity log file.
    #[arg(long, default_value = "replisync.log")]
    log_file: PathBuf,

    /// Time between synchronization passes.
    #[arg(short, long, default_value_t = 60)]
    interval: u64,

    /// Unit of the interval: seconds, minutes or hours.
    #[arg(short, long, default_value = "seconds")]
    unit: String,

    /// Plain-text journal mirroring the pending change events.
    #[arg(long)]
    event_journal: Option<PathBuf>,

    /// Load all settings from a JSON file instead.
    #[arg(short, long, conflicts_with_all = ["source", "replica"])]
    config: Option<PathBuf>,

    /// Use the polling watch backend (network and FUSE filesystems).
    #[arg(long)]
    poll: bool,

    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Assembles settings from the settings file or from the flags.
    fn settings(&self) -> Result<SyncSettings> {
        if let Some(config_path) = &self.config {
            return SyncSettings::load(config_path)
                .with_context(|| format!("Failed to load settings from {:?}", config_path));
        }

        let (Some(source), Some(replica)) = (&self.source, &self.replica) else {
            bail!("Both source and replica directories are required");
        };
        let unit: TimeUnit = self.unit.parse()?;

        Ok(SyncSettings {
            source: source.clone(),
            replica: replica.clone(),
            log_file: self.log_file.clone(),
            interval: self.interval,
            unit,
            event_journal: self.event_journal.clone(),
        })
    }
}

/// Main entry point for replisync.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = cli.settings()?;
    settings.validate().context("Invalid settings")?;
    init_activity_log(&settings.log_file, cli.verbose)
        .context("Failed to initialize the activity log")?;

    let pair = settings.sync_pair()?;
    let event_log = match &settings.event_journal {
        Some(journal) => EventLog::with_journal(journal)
            .with_context(|| format!("Failed to open event journal {:?}", journal))?,
        None => EventLog::in_memory(),
    };

    let config = SchedulerConfig {
        interval: settings.interval(),
        file_watcher_config: FileWatcherConfig {
            use_polling: cli.poll,
            ..FileWatcherConfig::default()
        },
        ..SchedulerConfig::default()
    };
    let scheduler = SyncScheduler::new(pair, Arc::new(event_log), Some(config));

    // Register the Ctrl-C handler before the first pass starts
    let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();
    spawn(async move {
        if let Err(e) = ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            pending::<()>().await;
        }
        let _ = shutdown_sender.send(());
    });

    scheduler
        .run(async {
            let _ = shutdown_receiver.await;
        })
        .await
        .context("Failed to watch the source directory")?;

    info!("Synchronization stopped");
    Ok(())
}
