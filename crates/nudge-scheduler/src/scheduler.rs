//! Reminder scheduler implementation.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use nudge_store::ReminderRepository;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::evaluator::{ConditionEvaluator, EvaluationContext, RuleEvaluator};
use crate::geo::GeoTracker;
use crate::host::{HostContext, NoTasks, StaticHostContext, TaskStore};
use crate::notify::{Notification, NotificationSink};
use crate::{SchedulerConfig, SchedulerError, TickReport};

/// Everything a tick needs, shared between the handle and the loop task.
struct Shared {
    config: SchedulerConfig,
    repository: Arc<dyn ReminderRepository>,
    sink: Arc<dyn NotificationSink>,
    evaluator: Arc<dyn ConditionEvaluator>,
    geo: Arc<GeoTracker>,
    tasks: Arc<dyn TaskStore>,
    host: Arc<dyn HostContext>,
    clock: Arc<dyn Clock>,
    /// Held for the duration of a tick so passes never overlap.
    tick_guard: tokio::sync::Mutex<()>,
}

/// A running loop task and the channel that stops it.
struct RunningLoop {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodically evaluates active reminders and fires notifications.
///
/// The scheduler is the only writer of `last_triggered_at`. Each reminder
/// fires at most once per cooldown window while its condition holds.
pub struct Scheduler {
    shared: Arc<Shared>,
    running: Mutex<Option<RunningLoop>>,
}

/// Builder for [`Scheduler`]. Collaborators left unset get inert defaults.
pub struct SchedulerBuilder {
    repository: Arc<dyn ReminderRepository>,
    sink: Arc<dyn NotificationSink>,
    config: SchedulerConfig,
    evaluator: Option<Arc<dyn ConditionEvaluator>>,
    geo: Option<Arc<GeoTracker>>,
    tasks: Option<Arc<dyn TaskStore>>,
    host: Option<Arc<dyn HostContext>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SchedulerBuilder {
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the standard rules, e.g. with a recording evaluator.
    pub fn evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn geo(mut self, geo: Arc<GeoTracker>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn tasks(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn host(mut self, host: Arc<dyn HostContext>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and build the scheduler.
    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        self.config.validate()?;

        let evaluator: Arc<dyn ConditionEvaluator> = match self.evaluator {
            Some(evaluator) => evaluator,
            None => Arc::new(RuleEvaluator::new(self.config.time_match_window)),
        };
        let tasks: Arc<dyn TaskStore> = match self.tasks {
            Some(tasks) => tasks,
            None => Arc::new(NoTasks),
        };
        let host: Arc<dyn HostContext> = match self.host {
            Some(host) => host,
            None => Arc::new(StaticHostContext::default()),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        Ok(Scheduler {
            shared: Arc::new(Shared {
                config: self.config,
                repository: self.repository,
                sink: self.sink,
                evaluator,
                geo: self.geo.unwrap_or_default(),
                tasks,
                host,
                clock,
                tick_guard: tokio::sync::Mutex::new(()),
            }),
            running: Mutex::new(None),
        })
    }
}

impl Scheduler {
    /// Start building a scheduler over a repository and a sink.
    pub fn builder(
        repository: Arc<dyn ReminderRepository>,
        sink: Arc<dyn NotificationSink>,
    ) -> SchedulerBuilder {
        SchedulerBuilder {
            repository,
            sink,
            config: SchedulerConfig::default(),
            evaluator: None,
            geo: None,
            tasks: None,
            host: None,
            clock: None,
        }
    }

    /// The position cell this scheduler reads from.
    pub fn geo(&self) -> &Arc<GeoTracker> {
        &self.shared.geo
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Whether the periodic loop is running.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Spawn the periodic loop on the current Tokio runtime.
    ///
    /// Returns `false` if the loop was already running; starting twice is a
    /// no-op.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            debug!("scheduler already running");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(Arc::clone(&self.shared), shutdown_rx));
        *running = Some(RunningLoop {
            shutdown_tx,
            handle,
        });
        true
    }

    /// Stop the loop and wait for any in-flight tick to finish.
    ///
    /// This includes a pass started through [`Scheduler::tick`], so once
    /// this returns no notification is still being delivered. Stopping a
    /// scheduler that isn't running only waits for such a pass.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(RunningLoop {
            shutdown_tx,
            handle,
        }) = running
        {
            let _ = shutdown_tx.send(true);
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler loop ended abnormally");
            }
        }

        // A manual tick may still hold the guard
        let _guard = self.shared.tick_guard.lock().await;
    }

    /// Run one evaluation pass now.
    ///
    /// If another pass is still in progress this one is skipped, not
    /// queued.
    pub async fn tick(&self) -> TickReport {
        self.shared.tick().await
    }
}

/// Tick on a fixed period until shutdown is signalled.
async fn run_loop(shared: Arc<Shared>, mut shutdown_rx: watch::Receiver<bool>) {
    let period = shared.config.tick_interval;
    info!(tick_secs = period.as_secs(), "scheduler starting");

    let mut interval = tokio::time::interval(period);
    // Late ticks are dropped rather than replayed in a burst
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                info!("scheduler received shutdown signal");
                break;
            }
            _ = interval.tick() => {
                let report = shared.tick().await;
                debug!(?report, "tick finished");
            }
        }
    }

    info!("scheduler shut down gracefully");
}

impl Shared {
    #[tracing::instrument(skip(self))]
    async fn tick(&self) -> TickReport {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            debug!("previous tick still running, skipping");
            return TickReport::skipped();
        };

        let mut report = TickReport::default();
        let now = self.clock.now();
        let now_utc = now.with_timezone(&Utc);

        let reminders = match self.repository.list_active().await {
            Ok(reminders) => reminders,
            Err(e) => {
                error!(error = %e, "failed to load active reminders");
                report.store_failures += 1;
                return report;
            }
        };

        let position = self.geo.current_position();
        let ctx = EvaluationContext {
            now,
            position: position.as_ref(),
            tasks: self.tasks.as_ref(),
            host: self.host.as_ref(),
        };

        for reminder in reminders.iter().filter(|r| r.active) {
            report.evaluated += 1;

            if !self.evaluator.should_fire(reminder, &ctx) {
                continue;
            }

            if reminder.in_cooldown(now_utc, self.config.cooldown) {
                debug!(
                    reminder_id = %reminder.id,
                    kind = %reminder.kind(),
                    "reminder cooling down"
                );
                report.cooling_down += 1;
                continue;
            }

            let notification = Notification::for_reminder(reminder, self.tasks.as_ref());
            if let Err(e) = self.sink.notify(&notification).await {
                // Still counts against the cooldown
                warn!(reminder_id = %reminder.id, error = %e, "notification failed");
                report.notify_failures += 1;
            }

            match self.repository.record_trigger(&reminder.id, now_utc).await {
                Ok(()) => {
                    info!(
                        reminder_id = %reminder.id,
                        task_id = %reminder.task_id,
                        kind = %reminder.kind(),
                        "reminder fired"
                    );
                    report.fired += 1;
                }
                Err(e) => {
                    error!(reminder_id = %reminder.id, error = %e, "failed to record trigger");
                    report.store_failures += 1;
                }
            }
        }

        debug!(
            evaluated = report.evaluated,
            fired = report.fired,
            cooling_down = report.cooling_down,
            "tick complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use nudge_store::{Conditions, ContextCondition, MemoryRepository, NewReminder};
    use tokio::sync::Semaphore;

    use crate::NotifyError;

    /// Counts notifications; optionally parks each one until released.
    #[derive(Default)]
    struct CountingSink {
        sent: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl NotificationSink for CountingSink {
        async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
            if let Some(gate) = &self.gate {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|e| NotifyError::Delivery(e.to_string()))?;
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn foreground_reminder(repo: &MemoryRepository) {
        repo.add(NewReminder::new(
            "t1",
            Conditions::Context(ContextCondition {
                app_in_foreground: Some(true),
                device_activity: None,
            }),
        ))
        .await
        .unwrap();
    }

    fn scheduler(repo: Arc<MemoryRepository>, sink: Arc<CountingSink>) -> Scheduler {
        Scheduler::builder(repo, sink)
            .host(Arc::new(StaticHostContext::new(true, None)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let result = Scheduler::builder(
            Arc::new(MemoryRepository::new()),
            Arc::new(CountingSink::default()),
        )
        .config(SchedulerConfig::from_secs(0, 300, 60).unwrap())
        .build();
        assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let scheduler = scheduler(
            Arc::new(MemoryRepository::new()),
            Arc::new(CountingSink::default()),
        );

        // Stopping before starting is a no-op
        scheduler.stop().await;
        assert!(!scheduler.is_running());

        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_running());

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());

        // Can be restarted after a stop
        assert!(scheduler.start());
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_on_period() {
        let repo = Arc::new(MemoryRepository::new());
        foreground_reminder(&repo).await;
        let sink = Arc::new(CountingSink::default());
        let scheduler = scheduler(Arc::clone(&repo), Arc::clone(&sink));

        scheduler.start();
        // First tick fires immediately
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.sent.load(Ordering::SeqCst), 1);

        // Wall clock barely moves under paused time, so later ticks are
        // still inside the cooldown
        tokio::time::sleep(Duration::from_secs(180)).await;
        assert_eq!(sink.sent.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let repo = Arc::new(MemoryRepository::new());
        foreground_reminder(&repo).await;
        let gate = Arc::new(Semaphore::new(0));
        let sink = Arc::new(CountingSink {
            sent: AtomicUsize::new(0),
            gate: Some(Arc::clone(&gate)),
        });
        let scheduler = Arc::new(scheduler(Arc::clone(&repo), Arc::clone(&sink)));

        let first = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.tick().await })
        };
        // Wait until the first tick is parked in the sink holding the guard
        while scheduler.shared.tick_guard.try_lock().is_ok() {
            tokio::task::yield_now().await;
        }

        let second = scheduler.tick().await;
        assert!(second.skipped);

        gate.add_permits(1);
        let first = first.await.unwrap();
        assert!(!first.skipped);
        assert_eq!(first.fired, 1);
        assert_eq!(sink.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_tick() {
        let repo = Arc::new(MemoryRepository::new());
        foreground_reminder(&repo).await;
        let gate = Arc::new(Semaphore::new(0));
        let sink = Arc::new(CountingSink {
            sent: AtomicUsize::new(0),
            gate: Some(Arc::clone(&gate)),
        });
        let scheduler = Arc::new(scheduler(Arc::clone(&repo), Arc::clone(&sink)));

        scheduler.start();
        // Wait until the first tick holds the guard
        while scheduler.shared.tick_guard.try_lock().is_ok() {
            tokio::task::yield_now().await;
        }

        let stopper = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.stop().await })
        };
        tokio::task::yield_now().await;
        assert!(!stopper.is_finished());

        gate.add_permits(1);
        stopper.await.unwrap();

        // The in-flight notification completed before stop returned
        assert_eq!(sink.sent.load(Ordering::SeqCst), 1);
        assert!(repo.list_active().await.unwrap()[0].last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn test_stop_waits_for_manual_tick() {
        let repo = Arc::new(MemoryRepository::new());
        foreground_reminder(&repo).await;
        let gate = Arc::new(Semaphore::new(0));
        let sink = Arc::new(CountingSink {
            sent: AtomicUsize::new(0),
            gate: Some(Arc::clone(&gate)),
        });
        let scheduler = Arc::new(scheduler(Arc::clone(&repo), Arc::clone(&sink)));

        let ticker = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.tick().await })
        };
        // Wait until the manual tick holds the guard
        while scheduler.shared.tick_guard.try_lock().is_ok() {
            tokio::task::yield_now().await;
        }

        let stopper = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.stop().await })
        };
        tokio::task::yield_now().await;
        assert!(!stopper.is_finished());
        assert_eq!(sink.sent.load(Ordering::SeqCst), 0);

        gate.add_permits(1);
        stopper.await.unwrap();

        // Delivery finished before stop returned
        assert_eq!(sink.sent.load(Ordering::SeqCst), 1);
        assert_eq!(ticker.await.unwrap().fired, 1);
    }
}
