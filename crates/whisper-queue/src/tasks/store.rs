//! Authoritative in-memory task store with SQLite write-through
//!
//! Readers always get a cloned snapshot, so a poll can never observe a
//! half-applied transition. State transitions are mirrored to SQLite;
//! progress ticks stay memory-only.

use dashmap::DashMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use super::record::{FilePatch, NewTaskFile, Task};
use crate::error::{Error, Result};
use crate::storage::TaskDb;

/// Counts reported by [`TaskStore::clear_all`]
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ClearStats {
    pub deleted_tasks: usize,
    pub deleted_files: usize,
}

/// Single source of truth for task and file state
pub struct TaskStore {
    tasks: DashMap<Uuid, Task>,
    database: Arc<TaskDb>,
}

impl TaskStore {
    /// Create a store backed by the given database
    pub fn new(database: Arc<TaskDb>) -> Self {
        Self {
            tasks: DashMap::new(),
            database,
        }
    }

    /// Store over an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(TaskDb::in_memory().expect("in-memory database")))
    }

    /// Create a task with all files pending.
    ///
    /// Fails with a validation error when the batch is empty or larger
    /// than five files. The returned snapshot carries the generated id.
    pub fn create(&self, files: Vec<NewTaskFile>, user_id: Option<String>) -> Result<Task> {
        let task = Task::new(files, user_id)?;

        if let Err(e) = self.database.insert_task(&task) {
            tracing::error!("Failed to persist task {}: {}", task.task_id, e);
        }

        self.tasks.insert(task.task_id, task.clone());
        tracing::info!(
            "Created task {} with {} file(s)",
            task.task_id,
            task.files.len()
        );

        Ok(task)
    }

    /// Snapshot of a task and all of its files
    pub fn get(&self, task_id: Uuid) -> Result<Task> {
        self.tasks
            .get(&task_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| Error::not_found(format!("Task {} not found", task_id)))
    }

    /// Apply one file transition under the task's entry lock.
    ///
    /// A `Started` patch is refused while a sibling file of the same task
    /// is still processing; files advance strictly one at a time. Terminal
    /// patches are written through to SQLite, and the patch that brings
    /// the last file into a terminal status also stamps the task's
    /// `completed_at`.
    pub fn update_file(&self, task_id: Uuid, file_index: usize, patch: FilePatch) -> Result<()> {
        let mut entry = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| Error::not_found(format!("Task {} not found", task_id)))?;

        let task = entry.value_mut();
        if file_index >= task.files.len() {
            return Err(Error::not_found(format!(
                "File {} not found in task {}",
                file_index, task_id
            )));
        }

        if matches!(patch, FilePatch::Started) && task.any_processing() {
            return Err(Error::store(format!(
                "Task {} already has a file processing",
                task_id
            )));
        }

        let persist = !matches!(patch, FilePatch::Progress(_));
        task.files[file_index].apply(patch)?;
        task.updated_at = chrono::Utc::now();

        let mut newly_completed = None;
        if task.completed_at.is_none() && task.all_terminal() {
            let now = chrono::Utc::now();
            task.completed_at = Some(now);
            newly_completed = Some(now);
        }

        let file_snapshot = if persist {
            Some(task.files[file_index].clone())
        } else {
            None
        };
        drop(entry); // Release lock before persisting

        if let Some(file) = file_snapshot {
            if let Err(e) = self.database.update_file_row(task_id, &file) {
                tracing::error!(
                    "Failed to persist file {} of task {}: {}",
                    file.file_index,
                    task_id,
                    e
                );
            }
            if let Some(at) = newly_completed {
                if let Err(e) = self.database.mark_task_completed(task_id, at) {
                    tracing::error!("Failed to persist completion of task {}: {}", task_id, e);
                }
            }
        }

        Ok(())
    }

    /// Remove every task, in memory and in the database.
    ///
    /// Readers racing this call see either the old task or nothing; a task
    /// is never observed partially cleared.
    pub fn clear_all(&self) -> Result<ClearStats> {
        let deleted_tasks = self.tasks.len();
        let deleted_files = self.tasks.iter().map(|entry| entry.files.len()).sum();

        self.tasks.clear();
        self.database.clear_all()?;

        tracing::info!(
            "Cleared {} task(s) and {} file(s)",
            deleted_tasks,
            deleted_files
        );

        Ok(ClearStats {
            deleted_tasks,
            deleted_files,
        })
    }

    /// Drop a single task from memory and the database.
    ///
    /// Rolls back a submission that could not be handed to the queue.
    /// Mirror failures are logged, not surfaced.
    pub fn remove(&self, task_id: Uuid) -> bool {
        let removed = self.tasks.remove(&task_id).is_some();
        if removed {
            if let Err(e) = self.database.delete_task(task_id) {
                tracing::error!("Failed to delete task {} from database: {}", task_id, e);
            }
            tracing::info!("Removed task {}", task_id);
        }
        removed
    }

    /// Number of tasks currently tracked
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Spool locations of every tracked file.
    ///
    /// Terminal files were already swept by the worker; deleting their
    /// paths again is a harmless no-op.
    pub fn spool_paths(&self) -> Vec<PathBuf> {
        self.tasks
            .iter()
            .flat_map(|entry| entry.files.iter().map(|f| f.path.clone()).collect::<Vec<_>>())
            .collect()
    }
}
