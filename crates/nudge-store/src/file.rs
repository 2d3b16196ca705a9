//! JSON file repository.
//!
//! Reminders are kept in memory and written through to a single JSON
//! document on every change. A write that fails leaves the in-memory state
//! untouched and surfaces the error to the caller.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::repository::ReminderSet;
use crate::{Conditions, NewReminder, Reminder, ReminderRepository, StoreError};

/// Current on-disk format version.
const FILE_VERSION: u32 = 1;

/// On-disk document.
#[derive(Debug, Serialize, Deserialize)]
struct ReminderFile {
    version: u32,
    reminders: Vec<Reminder>,
}

/// Repository persisted as a JSON file.
#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    reminders: RwLock<ReminderSet>,
}

impl JsonFileRepository {
    /// Open the store at `path`.
    ///
    /// A missing file yields an empty store; it is created on first write.
    /// Records with an unknown kind or duplicate ids fail the load.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let set = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            let file: ReminderFile = serde_json::from_str(&content)?;
            if file.version != FILE_VERSION {
                return Err(StoreError::InvalidReminder(format!(
                    "unsupported store version {}",
                    file.version
                )));
            }
            ReminderSet::from_reminders(file.reminders)?
        } else {
            ReminderSet::default()
        };

        info!(count = set.all().len(), "opened reminder store");
        Ok(Self {
            path,
            reminders: RwLock::new(set),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the collection and persist it.
    ///
    /// The copy replaces the live collection only once the file write has
    /// succeeded. The write lock is held across the write so readers never
    /// observe state that is not on disk.
    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut ReminderSet) -> Result<(T, bool), StoreError>,
    ) -> Result<T, StoreError> {
        let mut live = self.reminders.write().await;
        let mut next = live.clone();

        let (out, changed) = change(&mut next)?;
        if changed {
            self.save(&next).await?;
            *live = next;
        }
        Ok(out)
    }

    /// Write the collection to disk with restricted permissions.
    async fn save(&self, set: &ReminderSet) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let document = ReminderFile {
            version: FILE_VERSION,
            reminders: set.all(),
        };
        let content = serde_json::to_string_pretty(&document)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = file.metadata().await?.permissions();
            perms.set_mode(0o600);
            file.set_permissions(perms).await?;
        }

        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        debug!(path = %self.path.display(), "saved reminder store");
        Ok(())
    }
}

#[async_trait]
impl ReminderRepository for JsonFileRepository {
    #[tracing::instrument(skip(self, reminder), fields(task_id = %reminder.task_id))]
    async fn add(&self, reminder: NewReminder) -> Result<Reminder, StoreError> {
        let stored = self
            .mutate(|set| Ok((set.insert_new(reminder, Utc::now())?, true)))
            .await?;
        info!(reminder_id = %stored.id, kind = %stored.kind(), "added reminder");
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<Reminder>, StoreError> {
        Ok(self.reminders.read().await.get(id))
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let removed = self
            .mutate(|set| {
                let removed = set.remove(id);
                Ok((removed, removed))
            })
            .await?;
        if removed {
            info!(reminder_id = %id, "removed reminder");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn set_active(&self, id: &str, active: bool) -> Result<(), StoreError> {
        self.mutate(|set| Ok(((), set.set_active(id, active)))).await
    }

    #[tracing::instrument(skip(self, conditions))]
    async fn update_conditions(
        &self,
        id: &str,
        conditions: Conditions,
    ) -> Result<Option<Reminder>, StoreError> {
        self.mutate(|set| {
            let updated = set.update_conditions(id, conditions);
            let changed = updated.is_some();
            Ok((updated, changed))
        })
        .await
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

    #[tracing::instrument(skip(self))]
    async fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.mutate(|set| Ok(((), set.record_trigger(id, at)))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LocationCondition, Position, TimeCondition};
    use tempfile::tempdir;

    fn geofence() -> NewReminder {
        NewReminder::new(
            "t1",
            Conditions::Location(LocationCondition {
                target: Some(Position::new(37.0, -122.0)),
                radius_meters: Some(100.0),
            }),
        )
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reminders.json");

        let stored = {
            let repo = JsonFileRepository::open(&path).await.unwrap();
            let stored = repo.add(geofence()).await.unwrap();
            repo.record_trigger(&stored.id, Utc::now()).await.unwrap();
            repo.get(&stored.id).await.unwrap().unwrap()
        };

        let reopened = JsonFileRepository::open(&path).await.unwrap();
        assert_eq!(reopened.get(&stored.id).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let repo = JsonFileRepository::open(dir.path().join("nested").join("r.json"))
            .await
            .unwrap();
        assert!(repo.list_all().await.unwrap().is_empty());

        // First write creates parent directories
        repo.add(geofence()).await.unwrap();
        assert!(repo.path().exists());
    }

    #[tokio::test]
    async fn test_rejects_unknown_kind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reminders.json");
        std::fs::write(
            &path,
            r#"{"version": 1, "reminders": [{
                "id": "r1", "taskId": "t1", "kind": "weather", "conditions": {},
                "active": true, "createdAt": "2024-05-01T12:00:00Z"
            }]}"#,
        )
        .unwrap();

        let err = JsonFileRepository::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Json(_)));
    }

    #[tokio::test]
    async fn test_rejects_unknown_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reminders.json");
        std::fs::write(&path, r#"{"version": 9, "reminders": []}"#).unwrap();

        let err = JsonFileRepository::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidReminder(_)));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_state() {
        let dir = tempdir().unwrap();
        // Parent path is a regular file, so every write fails
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let repo = JsonFileRepository::open(blocker.join("reminders.json"))
            .await
            .unwrap();

        let err = repo
            .add(NewReminder::new("t1", Conditions::Time(TimeCondition::default())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_noop_skips_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reminders.json");
        let repo = JsonFileRepository::open(&path).await.unwrap();

        repo.remove("nope").await.unwrap();
        repo.set_active("nope", false).await.unwrap();

        assert!(!path.exists());
    }
}
