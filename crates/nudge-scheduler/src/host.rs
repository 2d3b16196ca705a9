//! Read-only views of the host application consumed during evaluation.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use nudge_store::DeviceActivity;

/// Task Store access needed by Activity conditions and notification text.
pub trait TaskStore: Send + Sync {
    /// Whether the task has been completed.
    fn is_completed(&self, task_id: &str) -> bool;

    /// Minutes of tracked time accumulated on the task.
    fn tracked_minutes(&self, task_id: &str) -> f64;

    /// Human-readable task title, if known.
    fn title(&self, _task_id: &str) -> Option<String> {
        None
    }
}

/// A task store that knows no tasks: nothing is completed, nothing tracked.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTasks;

impl TaskStore for NoTasks {
    fn is_completed(&self, _task_id: &str) -> bool {
        false
    }

    fn tracked_minutes(&self, _task_id: &str) -> f64 {
        0.0
    }
}

/// Application and device state consumed by Context conditions.
pub trait HostContext: Send + Sync {
    /// Whether the application is currently foregrounded.
    fn app_in_foreground(&self) -> bool;

    /// Current device activity, or `None` when the host cannot tell.
    fn device_activity(&self) -> Option<DeviceActivity>;
}

const ACTIVITY_UNKNOWN: u8 = 0;
const ACTIVITY_IDLE: u8 = 1;
const ACTIVITY_ACTIVE: u8 = 2;

/// Host context whose values are pushed in by the embedding application.
#[derive(Debug)]
pub struct StaticHostContext {
    foreground: AtomicBool,
    activity: AtomicU8,
}

impl Default for StaticHostContext {
    fn default() -> Self {
        Self {
            foreground: AtomicBool::new(false),
            activity: AtomicU8::new(ACTIVITY_UNKNOWN),
        }
    }
}

impl StaticHostContext {
    pub fn new(foreground: bool, activity: Option<DeviceActivity>) -> Self {
        let host = Self::default();
        host.set_foreground(foreground);
        host.set_device_activity(activity);
        host
    }

    pub fn set_foreground(&self, foreground: bool) {
        self.foreground.store(foreground, Ordering::Release);
    }

    pub fn set_device_activity(&self, activity: Option<DeviceActivity>) {
        let encoded = match activity {
            None => ACTIVITY_UNKNOWN,
            Some(DeviceActivity::Idle) => ACTIVITY_IDLE,
            Some(DeviceActivity::Active) => ACTIVITY_ACTIVE,
        };
        self.activity.store(encoded, Ordering::Release);
    }
}

impl HostContext for StaticHostContext {
    fn app_in_foreground(&self) -> bool {
        self.foreground.load(Ordering::Acquire)
    }

    fn device_activity(&self) -> Option<DeviceActivity> {
        match self.activity.load(Ordering::Acquire) {
            ACTIVITY_IDLE => Some(DeviceActivity::Idle),
            ACTIVITY_ACTIVE => Some(DeviceActivity::Active),
            _ => None,
        }
    }
}
