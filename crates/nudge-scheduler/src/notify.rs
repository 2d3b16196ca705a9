//! Notification sink contract and reminder message text.

use async_trait::async_trait;
use nudge_store::{ActivityCondition, Conditions, Reminder};
use serde::{Deserialize, Serialize};

use crate::NotifyError;
use crate::host::TaskStore;

/// Title used when the task store has no title for the task.
const DEFAULT_TITLE: &str = "Reminder";

/// An alert request handed to a [`NotificationSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Groups repeated alerts for the same reminder. Set to the reminder id.
    pub tag: String,
}

impl Notification {
    /// Build the alert for a reminder that just fired.
    pub fn for_reminder(reminder: &Reminder, tasks: &dyn TaskStore) -> Self {
        let task_title = tasks.title(&reminder.task_id);
        let subject = task_title.as_deref().unwrap_or("your task");

        let body = match &reminder.conditions {
            Conditions::Time(_) => format!("It's time for {subject}."),
            Conditions::Location(c) => {
                let place = c
                    .target
                    .as_ref()
                    .and_then(|p| p.label.as_deref())
                    .unwrap_or("a saved location");
                format!("You're near {place}. Don't forget {subject}.")
            }
            Conditions::Activity(c) => activity_body(c, subject, tasks),
            Conditions::Context(_) => format!("Now is a good moment for {subject}."),
        };

        Self {
            title: task_title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body,
            tag: reminder.id.clone(),
        }
    }
}

/// Describe whichever activity rule currently holds.
fn activity_body(condition: &ActivityCondition, subject: &str, tasks: &dyn TaskStore) -> String {
    if let Some(after) = condition.after_task_id.as_deref()
        && !after.is_empty()
        && tasks.is_completed(after)
    {
        let done = tasks.title(after).unwrap_or_else(|| after.to_string());
        return format!("\"{done}\" is done. Time for {subject}.");
    }

    match condition.after_minutes_spent {
        Some(minutes) if minutes > 0 => format!("You've spent {minutes} minutes on {subject}."),
        _ => format!("Time for {subject}."),
    }
}

/// Accepts fire-and-forget alert requests.
///
/// The scheduler logs a failed delivery and never retries it.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}
