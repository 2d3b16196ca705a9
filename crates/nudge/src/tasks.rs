//! Task snapshot read from a JSON file.
//!
//! The host application exports its tasks as
//! `[{"id", "title", "completed", "trackedMinutes"}]`. The daemon reloads the
//! file on every tick so completions and tracked time show up without a
//! restart.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use nudge_scheduler::TaskStore;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Errors loading the task snapshot.
#[derive(Debug, Error)]
pub enum TaskSnapshotError {
    #[error("failed to read task file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid task file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// One exported task.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub tracked_minutes: f64,
}

/// In-memory view of the host's tasks.
#[derive(Debug, Default)]
pub struct TaskSnapshot {
    path: Option<PathBuf>,
    tasks: DashMap<String, TaskRecord>,
}

impl TaskSnapshot {
    /// Snapshot backed by `path`. Nothing is loaded until [`reload`](Self::reload).
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            tasks: DashMap::new(),
        }
    }

    /// Re-read the backing file and replace the snapshot.
    ///
    /// A missing file counts as no tasks. On a read or parse error the
    /// previous snapshot is kept.
    pub async fn reload(&self) -> Result<usize, TaskSnapshotError> {
        let Some(path) = &self.path else {
            return Ok(self.tasks.len());
        };

        let records = read_records(path).await?;
        self.replace(records);
        debug!(count = self.tasks.len(), "reloaded task snapshot");
        Ok(self.tasks.len())
    }

    /// Replace the whole snapshot.
    pub fn replace(&self, records: Vec<TaskRecord>) {
        self.tasks.retain(|id, _| records.iter().any(|r| &r.id == id));
        for record in records {
            self.tasks.insert(record.id.clone(), record);
        }
    }
}

async fn read_records(path: &Path) -> Result<Vec<TaskRecord>, TaskSnapshotError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| TaskSnapshotError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&content).map_err(|source| TaskSnapshotError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl TaskStore for TaskSnapshot {
    fn is_completed(&self, task_id: &str) -> bool {
        self.tasks.get(task_id).is_some_and(|t| t.completed)
    }

    fn tracked_minutes(&self, task_id: &str) -> f64 {
        self.tasks
            .get(task_id)
            .map(|t| t.tracked_minutes)
            .unwrap_or(0.0)
    }

    fn title(&self, task_id: &str) -> Option<String> {
        self.tasks.get(task_id).and_then(|t| t.title.clone())
    }
}
