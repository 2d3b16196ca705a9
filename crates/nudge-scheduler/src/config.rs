//! Scheduler configuration.

use chrono::Duration;
use tracing::warn;

use crate::SchedulerError;

/// Default time between ticks.
pub const DEFAULT_TICK_SECS: u64 = 60;

/// Default minimum time between two firings of one reminder.
pub const DEFAULT_COOLDOWN_SECS: i64 = 300;

/// Default tolerance around an absolute trigger time.
pub const DEFAULT_TIME_MATCH_WINDOW_SECS: i64 = 60;

/// Timing knobs for the scheduler loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Period between evaluation passes.
    pub tick_interval: std::time::Duration,
    /// Minimum time between firings of the same reminder.
    pub cooldown: Duration,
    /// A `triggerAt` reminder fires while `|now - triggerAt|` is below this.
    pub time_match_window: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: std::time::Duration::from_secs(DEFAULT_TICK_SECS),
            cooldown: Duration::seconds(DEFAULT_COOLDOWN_SECS),
            time_match_window: Duration::seconds(DEFAULT_TIME_MATCH_WINDOW_SECS),
        }
    }
}

impl SchedulerConfig {
    /// Build from whole seconds, as read from the command line.
    ///
    /// Fails when a value is too large to represent as a duration.
    pub fn from_secs(
        tick: u64,
        cooldown: i64,
        time_match_window: i64,
    ) -> Result<Self, SchedulerError> {
        Ok(Self {
            tick_interval: std::time::Duration::from_secs(tick),
            cooldown: seconds("cooldown", cooldown)?,
            time_match_window: seconds("time match window", time_match_window)?,
        })
    }

    /// Reject configurations the loop can't honor.
    ///
    /// The cooldown must be at least one tick long, otherwise a condition
    /// that stays true would fire on every tick.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.tick_interval.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "tick interval must be positive".to_string(),
            ));
        }
        if self.cooldown <= Duration::zero() {
            return Err(SchedulerError::InvalidConfig(
                "cooldown must be positive".to_string(),
            ));
        }
        if self.time_match_window <= Duration::zero() {
            return Err(SchedulerError::InvalidConfig(
                "time match window must be positive".to_string(),
            ));
        }

        let tick = Duration::from_std(self.tick_interval)
            .map_err(|e| SchedulerError::InvalidConfig(format!("tick interval: {e}")))?;
        if self.cooldown < tick {
            return Err(SchedulerError::InvalidConfig(format!(
                "cooldown ({}s) is shorter than the tick interval ({}s)",
                self.cooldown.num_seconds(),
                tick.num_seconds()
            )));
        }

        // A window narrower than half a tick can fall between two passes
        if self
            .time_match_window
            .checked_add(&self.time_match_window)
            .is_some_and(|span| span < tick)
        {
            warn!(
                window_secs = self.time_match_window.num_seconds(),
                tick_secs = tick.num_seconds(),
                "time match window is narrower than half a tick; one-shot reminders may be missed"
            );
        }

        Ok(())
    }
}

fn seconds(name: &str, secs: i64) -> Result<Duration, SchedulerError> {
    Duration::try_seconds(secs)
        .ok_or_else(|| SchedulerError::InvalidConfig(format!("{name} of {secs}s is out of range")))
}
