//! Reminder repository trait and in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{Conditions, NewReminder, Reminder, StoreError};

/// CRUD access to reminder records.
///
/// All methods are safe to call concurrently with scheduler ticks. Writes
/// take effect for the next reader as soon as they return.
#[async_trait]
pub trait ReminderRepository: Send + Sync {
    /// Store a new reminder, assigning an id and `created_at`.
    async fn add(&self, reminder: NewReminder) -> Result<Reminder, StoreError>;

    /// Get a reminder by id.
    async fn get(&self, id: &str) -> Result<Option<Reminder>, StoreError>;

    /// Delete a reminder. Missing ids are ignored.
    async fn remove(&self, id: &str) -> Result<(), StoreError>;

    /// Toggle a reminder on or off. Missing ids are ignored.
    async fn set_active(&self, id: &str, active: bool) -> Result<(), StoreError>;

    /// Replace a reminder's conditions (and therefore its kind).
    ///
    /// Returns the updated reminder, or `None` if the id is unknown.
    async fn update_conditions(
        &self,
        id: &str,
        conditions: Conditions,
    ) -> Result<Option<Reminder>, StoreError>;

    /// All reminders, active or not, oldest first.
    async fn list_all(&self) -> Result<Vec<Reminder>, StoreError>;

    /// All active reminders, oldest first.
    async fn list_active(&self) -> Result<Vec<Reminder>, StoreError>;

    /// Active reminders attached to one task.
    async fn list_active_for(&self, task_id: &str) -> Result<Vec<Reminder>, StoreError>;

    /// Record a successful firing. Only the scheduler calls this.
    async fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// The reminder collection shared by the repository implementations.
///
/// Mutators report whether anything changed so callers can skip
/// persisting no-ops.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReminderSet {
    reminders: HashMap<String, Reminder>,
}

impl ReminderSet {
    pub(crate) fn from_reminders(reminders: Vec<Reminder>) -> Result<Self, StoreError> {
        let mut set = Self::default();
        for reminder in reminders {
            if set.reminders.contains_key(&reminder.id) {
                return Err(StoreError::DuplicateId(reminder.id));
            }
            set.reminders.insert(reminder.id.clone(), reminder);
        }
        Ok(set)
    }

    pub(crate) fn insert_new(
        &mut self,
        new: NewReminder,
        now: DateTime<Utc>,
    ) -> Result<Reminder, StoreError> {
        if let Some(id) = &new.id {
            if id.is_empty() {
                return Err(StoreError::InvalidReminder("id cannot be empty".to_string()));
            }
            if self.reminders.contains_key(id) {
                return Err(StoreError::DuplicateId(id.clone()));
            }
        }

        let reminder = new.into_reminder(now);
        self.reminders.insert(reminder.id.clone(), reminder.clone());
        Ok(reminder)
    }

    pub(crate) fn get(&self, id: &str) -> Option<Reminder> {
        self.reminders.get(id).cloned()
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        self.reminders.remove(id).is_some()
    }

    pub(crate) fn set_active(&mut self, id: &str, active: bool) -> bool {
        match self.reminders.get_mut(id) {
            Some(reminder) if reminder.active != active => {
                reminder.active = active;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn update_conditions(
        &mut self,
        id: &str,
        conditions: Conditions,
    ) -> Option<Reminder> {
        let reminder = self.reminders.get_mut(id)?;
        reminder.conditions = conditions;
        Some(reminder.clone())
    }

    pub(crate) fn record_trigger(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        match self.reminders.get_mut(id) {
            Some(reminder) => {
                reminder.last_triggered_at = Some(at);
                true
            }
            None => false,
        }
    }

    pub(crate) fn all(&self) -> Vec<Reminder> {
        self.filtered(|_| true)
    }

    pub(crate) fn active(&self) -> Vec<Reminder> {
        self.filtered(|r| r.active)
    }

    pub(crate) fn active_for(&self, task_id: &str) -> Vec<Reminder> {
        self.filtered(|r| r.active && r.task_id == task_id)
    }

    fn filtered(&self, keep: impl Fn(&Reminder) -> bool) -> Vec<Reminder> {
        let mut out: Vec<Reminder> = self.reminders.values().filter(|r| keep(r)).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

/// Volatile repository backed by a locked map.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    reminders: RwLock<ReminderSet>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReminderRepository for MemoryRepository {
    #[tracing::instrument(skip(self, reminder), fields(task_id = %reminder.task_id))]
    async fn add(&self, reminder: NewReminder) -> Result<Reminder, StoreError> {
        let stored = self.reminders.write().await.insert_new(reminder, Utc::now())?;
        info!(reminder_id = %stored.id, kind = %stored.kind(), "added reminder");
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<Reminder>, StoreError> {
        Ok(self.reminders.read().await.get(id))
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        if self.reminders.write().await.remove(id) {
            info!(reminder_id = %id, "removed reminder");
        }
        Ok(())
    }

    async fn set_active(&self, id: &str, active: bool) -> Result<(), StoreError> {
        if self.reminders.write().await.set_active(id, active) {
            debug!(reminder_id = %id, active, "toggled reminder");
        }
        Ok(())
    }

    async fn update_conditions(
        &self,
        id: &str,
        conditions: Conditions,
    ) -> Result<Option<Reminder>, StoreError> {
        Ok(self.reminders.write().await.update_conditions(id, conditions))
    }

    async fn list_all(&self) -> Result<Vec<Reminder>, StoreError> {
        Ok(self.reminders.read().await.all())
    }

    async fn list_active(&self) -> Result<Vec<Reminder>, StoreError> {
        Ok(self.reminders.read().await.active())
    }

    async fn list_active_for(&self, task_id: &str) -> Result<Vec<Reminder>, StoreError> {
        Ok(self.reminders.read().await.active_for(task_id))
    }

    async fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if !self.reminders.write().await.record_trigger(id, at) {
            debug!(reminder_id = %id, "trigger recorded for missing reminder, ignoring");
        }
        Ok(())
    }
}
