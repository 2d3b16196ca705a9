//! Daemon command: runs the reminder scheduler until interrupted.
//!
//! The daemon wires together:
//! - The JSON file reminder store
//! - A static location provider feeding the geo tracker
//! - A task snapshot reloaded once per tick interval
//! - Host context flags from the command line
//! - A log or webhook notification sink

use std::path::PathBuf;
use std::sync::Arc;

use miette::{IntoDiagnostic, Result};
use nudge_scheduler::{GeoTracker, NotificationSink, Scheduler, SchedulerConfig, StaticHostContext};
use nudge_store::{DeviceActivity, JsonFileRepository};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::location::StaticLocationProvider;
use crate::sinks::{LogNotifier, WebhookNotifier};
use crate::tasks::TaskSnapshot;

/// Configuration for the daemon.
pub struct DaemonConfig {
    pub store_path: PathBuf,
    pub scheduler: SchedulerConfig,
    /// Exported task list; without it no task is known.
    pub tasks_path: Option<PathBuf>,
    /// POST notifications here instead of logging them.
    pub webhook_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_label: Option<String>,
    pub foreground: bool,
    pub device_activity: Option<DeviceActivity>,
}

/// Run the scheduler until Ctrl-C.
pub async fn run(config: DaemonConfig) -> Result<()> {
    let repository = Arc::new(
        JsonFileRepository::open(&config.store_path)
            .await
            .into_diagnostic()?,
    );
    info!(store = %config.store_path.display(), "using reminder store");

    let sink: Arc<dyn NotificationSink> = match &config.webhook_url {
        Some(url) => {
            info!(url = %url, "delivering notifications by webhook");
            Arc::new(WebhookNotifier::new(url))
        }
        None => Arc::new(LogNotifier),
    };

    let geo = Arc::new(GeoTracker::new());
    let provider = StaticLocationProvider::from_coordinates(
        config.latitude,
        config.longitude,
        config.location_label.clone(),
    );
    geo.follow(&provider);

    let tasks = Arc::new(match &config.tasks_path {
        Some(path) => TaskSnapshot::from_file(path),
        None => TaskSnapshot::default(),
    });
    if let Err(e) = tasks.reload().await {
        warn!(error = %e, "failed to load task snapshot, starting with no tasks");
    }

    let host = Arc::new(StaticHostContext::new(
        config.foreground,
        config.device_activity,
    ));

    let tick_interval = config.scheduler.tick_interval;
    let scheduler = Scheduler::builder(repository, sink)
        .config(config.scheduler)
        .geo(geo)
        .tasks(tasks.clone())
        .host(host)
        .build()
        .into_diagnostic()?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresher = spawn_task_refresher(tasks, tick_interval, shutdown_rx);

    scheduler.start();
    info!(
        tick_secs = tick_interval.as_secs(),
        "daemon running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await.into_diagnostic()?;
    info!("received shutdown signal");

    let _ = shutdown_tx.send(true);
    scheduler.stop().await;
    if let Err(e) = refresher.await {
        warn!(error = %e, "task refresher ended abnormally");
    }

    info!("daemon stopped");
    Ok(())
}

/// Reload the task snapshot on the scheduler's period.
fn spawn_task_refresher(
    tasks: Arc<TaskSnapshot>,
    period: std::time::Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately and the snapshot is already fresh
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("task refresher shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = tasks.reload().await {
                        warn!(error = %e, "failed to reload task snapshot, keeping previous");
                    }
                }
            }
        }
    })
}
