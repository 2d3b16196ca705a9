//! Condition evaluation.
//!
//! Decides whether a single reminder should fire given the current time,
//! position, task state and host context. Evaluation is pure: no I/O and
//! no side effects. Incomplete or malformed conditions never fire.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Timelike, Utc};
use nudge_store::{
    ActivityCondition, Conditions, ContextCondition, LocationCondition, Reminder, TimeCondition,
    TimeRange,
};

use crate::geo::{PositionFix, distance_meters};
use crate::host::{HostContext, TaskStore};

/// World state visible to one evaluation pass.
pub struct EvaluationContext<'a> {
    /// Current time in the user's local offset.
    pub now: DateTime<FixedOffset>,
    /// Latest known position, if any.
    pub position: Option<&'a PositionFix>,
    pub tasks: &'a dyn TaskStore,
    pub host: &'a dyn HostContext,
}

/// Judges whether a reminder should fire now.
pub trait ConditionEvaluator: Send + Sync {
    fn should_fire(&self, reminder: &Reminder, ctx: &EvaluationContext<'_>) -> bool;
}

/// The standard per-kind rules.
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    time_match_window: Duration,
}

impl RuleEvaluator {
    /// `time_match_window` is the tolerance around an absolute `triggerAt`.
    pub fn new(time_match_window: Duration) -> Self {
        Self { time_match_window }
    }

    fn time_fires(&self, condition: &TimeCondition, now: DateTime<FixedOffset>) -> bool {
        if let Some(at) = condition.trigger_at {
            let offset_ms = (now.with_timezone(&Utc) - at).num_milliseconds().abs();
            if offset_ms < self.time_match_window.num_milliseconds() {
                return true;
            }
        }

        if condition.days_of_week.is_empty() {
            return false;
        }

        let weekday = now.weekday().num_days_from_sunday() as u8;
        if !condition.days_of_week.contains(&weekday) {
            return false;
        }

        match &condition.time_range {
            None => true,
            Some(range) => within_range(range, now.time()),
        }
    }

    fn location_fires(condition: &LocationCondition, position: Option<&PositionFix>) -> bool {
        let (Some(target), Some(radius)) = (&condition.target, condition.radius_meters) else {
            return false;
        };
        if !target.is_valid() || !radius.is_finite() || radius < 0.0 {
            return false;
        }
        let Some(fix) = position else {
            return false;
        };

        distance_meters(target, &fix.position) <= radius
    }

    fn activity_fires(condition: &ActivityCondition, task_id: &str, tasks: &dyn TaskStore) -> bool {
        if let Some(after) = condition.after_task_id.as_deref()
            && !after.is_empty()
            && tasks.is_completed(after)
        {
            return true;
        }

        // A zero threshold is treated as unset
        if let Some(threshold) = condition.after_minutes_spent
            && threshold > 0
        {
            let spent = tasks.tracked_minutes(task_id);
            if spent.is_finite() && spent >= f64::from(threshold) {
                return true;
            }
        }

        false
    }

    fn context_fires(condition: &ContextCondition, host: &dyn HostContext) -> bool {
        if condition.app_in_foreground == Some(true) && host.app_in_foreground() {
            return true;
        }

        match condition.device_activity {
            Some(wanted) => host.device_activity() == Some(wanted),
            None => false,
        }
    }
}

impl ConditionEvaluator for RuleEvaluator {
    fn should_fire(&self, reminder: &Reminder, ctx: &EvaluationContext<'_>) -> bool {
        match &reminder.conditions {
            Conditions::Time(c) => self.time_fires(c, ctx.now),
            Conditions::Location(c) => Self::location_fires(c, ctx.position),
            Conditions::Activity(c) => Self::activity_fires(c, &reminder.task_id, ctx.tasks),
            Conditions::Context(c) => Self::context_fires(c, ctx.host),
        }
    }
}

/// Parse `HH:MM` into minutes past midnight.
fn minutes_of_day(hhmm: &str) -> Option<u32> {
    if hhmm.len() != 5 {
        return None;
    }
    let time = NaiveTime::parse_from_str(hhmm, "%H:%M").ok()?;
    Some(time.hour() * 60 + time.minute())
}

/// Inclusive `[start, end]` check at minute granularity.
///
/// Unparseable bounds and ranges with `start > end` never match.
fn within_range(range: &TimeRange, time: NaiveTime) -> bool {
    let (Some(start), Some(end)) = (minutes_of_day(&range.start), minutes_of_day(&range.end))
    else {
        return false;
    };
    let now = time.hour() * 60 + time.minute();
    start <= now && now <= end
}
