//! SQLite mirror of the task registry
//!
//! The in-memory store is authoritative while the process runs; every state
//! transition is written through here so operators can inspect task history
//! with plain sqlite tooling. Progress ticks are deliberately not persisted,
//! they arrive far too often to be worth a disk write each.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::tasks::{FileStatus, Task, TaskFile, Transcript};

/// SQLite-backed task database
pub struct TaskDb {
    conn: Arc<Mutex<Connection>>,
}

impl TaskDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("Failed to create database dir: {}", e)))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Internal(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        // WAL keeps readers cheap while the worker writes transitions
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA cache_size=10000;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            -- Task batches
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                user_id TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                updated_at TEXT NOT NULL,
                file_count INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at);

            -- Individual files within a task
            CREATE TABLE IF NOT EXISTS task_files (
                task_id TEXT NOT NULL,
                file_index INTEGER NOT NULL,
                filename TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                progress INTEGER NOT NULL DEFAULT 0,
                transcription TEXT,
                language TEXT,
                duration REAL,
                error_message TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                PRIMARY KEY (task_id, file_index),
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_task_files_task_id ON task_files(task_id);
            CREATE INDEX IF NOT EXISTS idx_task_files_status ON task_files(status);
        "#,
        )
        .map_err(|e| Error::Internal(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    // ==================== Task Operations ====================

    /// Insert a task with all of its files in one transaction
    pub fn insert_task(&self, task: &Task) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Internal(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            r#"
            INSERT INTO tasks (id, user_id, created_at, completed_at, updated_at, file_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                task.task_id.to_string(),
                task.user_id,
                task.created_at.to_rfc3339(),
                task.completed_at.map(|t| t.to_rfc3339()),
                task.updated_at.to_rfc3339(),
                task.files.len() as i64,
            ],
        )
        .map_err(|e| Error::Internal(format!("Failed to insert task: {}", e)))?;

        for file in &task.files {
            tx.execute(
                r#"
                INSERT INTO task_files (
                    task_id, file_index, filename, file_size, content_type, file_path,
                    status, progress, transcription, language, duration, error_message,
                    created_at, started_at, completed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
                params![
                    task.task_id.to_string(),
                    file.file_index as i64,
                    file.filename,
                    file.size as i64,
                    file.content_type,
                    file.path.to_string_lossy(),
                    file.status.as_str(),
                    file.progress as i64,
                    file.result.as_ref().map(|r| r.text.clone()),
                    file.result.as_ref().map(|r| r.language.clone()),
                    file.result.as_ref().map(|r| r.duration),
                    file.error,
                    file.created_at.to_rfc3339(),
                    file.started_at.map(|t| t.to_rfc3339()),
                    file.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| Error::Internal(format!("Failed to insert task file: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| Error::Internal(format!("Failed to commit task insert: {}", e)))?;

        Ok(())
    }

    /// Write a file's mutable fields after a state transition
    pub fn update_file_row(&self, task_id: Uuid, file: &TaskFile) -> Result<()> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            UPDATE task_files SET
                status = ?1, progress = ?2, transcription = ?3, language = ?4,
                duration = ?5, error_message = ?6, started_at = ?7, completed_at = ?8
            WHERE task_id = ?9 AND file_index = ?10
            "#,
            params![
                file.status.as_str(),
                file.progress as i64,
                file.result.as_ref().map(|r| r.text.clone()),
                file.result.as_ref().map(|r| r.language.clone()),
                file.result.as_ref().map(|r| r.duration),
                file.error,
                file.started_at.map(|t| t.to_rfc3339()),
                file.completed_at.map(|t| t.to_rfc3339()),
                task_id.to_string(),
                file.file_index as i64,
            ],
        )
        .map_err(|e| Error::Internal(format!("Failed to update task file: {}", e)))?;

        conn.execute(
            "UPDATE tasks SET updated_at = ?1 WHERE id = ?2",
            params![now, task_id.to_string()],
        )
        .map_err(|e| Error::Internal(format!("Failed to touch task: {}", e)))?;

        Ok(())
    }

    /// Record the moment the last file of a task reached a terminal status
    pub fn mark_task_completed(&self, task_id: Uuid, completed_at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            "UPDATE tasks SET completed_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![completed_at.to_rfc3339(), task_id.to_string()],
        )
        .map_err(|e| Error::Internal(format!("Failed to mark task completed: {}", e)))?;

        Ok(())
    }

    /// Reconstruct a full task from its rows
    pub fn load_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                "SELECT user_id, created_at, completed_at, updated_at FROM tasks WHERE id = ?1",
            )
            .map_err(|e| Error::Internal(format!("Failed to prepare query: {}", e)))?;

        let header = stmt
            .query_row(params![task_id.to_string()], |row| {
                let user_id: Option<String> = row.get(0)?;
                let created_at: String = row.get(1)?;
                let completed_at: Option<String> = row.get(2)?;
                let updated_at: String = row.get(3)?;
                Ok((user_id, created_at, completed_at, updated_at))
            })
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Error::not_found(format!("Task {} not found", task_id)),
                other => Error::Internal(format!("Failed to load task: {}", other)),
            });

        let (user_id, created_at, completed_at, updated_at) = match header {
            Ok(row) => row,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut stmt = conn
            .prepare(
                r#"
                SELECT file_index, filename, file_size, content_type, file_path,
                       status, progress, transcription, language, duration,
                       error_message, created_at, started_at, completed_at
                FROM task_files WHERE task_id = ?1 ORDER BY file_index
                "#,
            )
            .map_err(|e| Error::Internal(format!("Failed to prepare query: {}", e)))?;

        let files = stmt
            .query_map(params![task_id.to_string()], row_to_task_file)
            .map_err(|e| Error::Internal(format!("Failed to load task files: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(Some(Task {
            task_id,
            user_id,
            created_at: parse_timestamp(&created_at),
            completed_at: completed_at.as_deref().map(parse_timestamp),
            updated_at: parse_timestamp(&updated_at),
            files,
        }))
    }

    // ==================== Maintenance ====================

    /// Remove one task and its file rows; true when the task existed
    pub fn delete_task(&self, task_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();

        conn.execute(
            "DELETE FROM task_files WHERE task_id = ?1",
            params![task_id.to_string()],
        )
        .map_err(|e| Error::Internal(format!("Failed to delete task files: {}", e)))?;

        let deleted = conn
            .execute(
                "DELETE FROM tasks WHERE id = ?1",
                params![task_id.to_string()],
            )
            .map_err(|e| Error::Internal(format!("Failed to delete task: {}", e)))?;

        Ok(deleted > 0)
    }

    /// Remove every task and file row, returning (tasks, files) deleted
    pub fn clear_all(&self) -> Result<(usize, usize)> {
        let conn = self.conn.lock();

        let files = conn
            .execute("DELETE FROM task_files", [])
            .map_err(|e| Error::Internal(format!("Failed to clear task files: {}", e)))?;

        let tasks = conn
            .execute("DELETE FROM tasks", [])
            .map_err(|e| Error::Internal(format!("Failed to clear tasks: {}", e)))?;

        Ok((tasks, files))
    }

    /// Number of task rows currently stored
    pub fn count_tasks(&self) -> Result<usize> {
        let conn = self.conn.lock();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .map_err(|e| Error::Internal(format!("Failed to count tasks: {}", e)))?;

        Ok(count as usize)
    }
}

// Helper functions

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_task_file(row: &rusqlite::Row) -> rusqlite::Result<TaskFile> {
    let file_index: i64 = row.get(0)?;
    let filename: String = row.get(1)?;
    let file_size: i64 = row.get(2)?;
    let content_type: String = row.get(3)?;
    let file_path: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let progress: i64 = row.get(6)?;
    let transcription: Option<String> = row.get(7)?;
    let language: Option<String> = row.get(8)?;
    let duration: Option<f64> = row.get(9)?;
    let error_message: Option<String> = row.get(10)?;
    let created_at: String = row.get(11)?;
    let started_at: Option<String> = row.get(12)?;
    let completed_at: Option<String> = row.get(13)?;

    let result = match (transcription, language) {
        (Some(text), Some(language)) => Some(Transcript {
            text,
            language,
            duration: duration.unwrap_or(0.0),
        }),
        _ => None,
    };

    Ok(TaskFile {
        file_index: file_index as usize,
        filename,
        size: file_size as u64,
        content_type,
        path: file_path.into(),
        status: status_str.parse().unwrap_or(FileStatus::Failed),
        progress: progress.clamp(0, 100) as u8,
        result,
        error: error_message,
        created_at: parse_timestamp(&created_at),
        started_at: started_at.as_deref().map(parse_timestamp),
        completed_at: completed_at.as_deref().map(parse_timestamp),
    })
}
