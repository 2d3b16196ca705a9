//! Context-aware reminder scheduler for Nudge.
//!
//! This crate provides a periodic scheduler that:
//! - Evaluates time, location, activity and context conditions
//! - Tracks the latest device position and geofence distances
//! - Fires each reminder at most once per cooldown window
//! - Takes time, position and notification delivery as injected traits

mod clock;
mod config;
mod error;
mod evaluator;
mod geo;
mod host;
mod notify;
mod scheduler;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    DEFAULT_COOLDOWN_SECS, DEFAULT_TICK_SECS, DEFAULT_TIME_MATCH_WINDOW_SECS, SchedulerConfig,
};
pub use error::{LocationError, NotifyError, SchedulerError};
pub use evaluator::{ConditionEvaluator, EvaluationContext, RuleEvaluator};
pub use geo::{
    EARTH_RADIUS_METERS, GeoTracker, LocationProvider, PositionCallback, PositionFix,
    distance_meters,
};
pub use host::{HostContext, NoTasks, StaticHostContext, TaskStore};
pub use notify::{Notification, NotificationSink};
pub use scheduler::{Scheduler, SchedulerBuilder};
pub use types::TickReport;
