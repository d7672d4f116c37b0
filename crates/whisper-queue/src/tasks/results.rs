//! Read-side shaping of task state into result views
//!
//! Everything here is pure: handlers grab a task snapshot from the store
//! and shape it, so results for a finished file are visible the moment its
//! status flips, regardless of what its siblings are doing.

use serde::Serialize;
use uuid::Uuid;

use super::record::{FileStatus, Task, TaskFile};
use super::summary::{summarize, TaskSummary};
use crate::error::{Error, Result};

/// Result view of one completed file
#[derive(Debug, Clone, Serialize)]
pub struct CompletedFileResult {
    pub file_index: usize,
    pub filename: String,
    pub transcription: String,
    pub language: String,
    pub duration: f64,
    pub completed_at: Option<String>,
}

/// View of one file at any point in its lifecycle
#[derive(Debug, Clone, Serialize)]
pub struct FileResultView {
    pub file_index: usize,
    pub filename: String,
    pub status: String,
    pub progress: u8,
    pub transcription: Option<String>,
    pub language: Option<String>,
    pub duration: Option<f64>,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Full result view: every file plus the derived summary
#[derive(Debug, Clone, Serialize)]
pub struct TaskResults {
    pub task_id: Uuid,
    pub summary: TaskSummary,
    pub results: Vec<FileResultView>,
    pub completed_at: Option<String>,
}

/// Files that have finished successfully, in index order.
///
/// Usable mid-processing; siblings still pending or failed are simply
/// absent from the list.
pub fn completed_results(task: &Task) -> Vec<CompletedFileResult> {
    task.files
        .iter()
        .filter(|f| f.status == FileStatus::Completed)
        .map(|f| {
            let result = f.result.as_ref();
            CompletedFileResult {
                file_index: f.file_index,
                filename: f.filename.clone(),
                transcription: result.map(|r| r.text.clone()).unwrap_or_default(),
                language: result.map(|r| r.language.clone()).unwrap_or_default(),
                duration: result.map(|r| r.duration).unwrap_or(0.0),
                completed_at: f.completed_at.map(|t| t.to_rfc3339()),
            }
        })
        .collect()
}

/// Full view of every file, whatever its status
pub fn all_results(task: &Task) -> TaskResults {
    TaskResults {
        task_id: task.task_id,
        summary: summarize(&task.files),
        results: task.files.iter().map(file_view).collect(),
        completed_at: task.completed_at.map(|t| t.to_rfc3339()),
    }
}

/// View of a single file; fails when the index is out of range
pub fn file_result(task: &Task, file_index: usize) -> Result<FileResultView> {
    task.file(file_index).map(file_view).ok_or_else(|| {
        Error::not_found(format!(
            "File {} not found in task {}",
            file_index, task.task_id
        ))
    })
}

fn file_view(file: &TaskFile) -> FileResultView {
    let result = file.result.as_ref();
    FileResultView {
        file_index: file.file_index,
        filename: file.filename.clone(),
        status: file.status.as_str().to_string(),
        progress: file.progress,
        transcription: result.map(|r| r.text.clone()),
        language: result.map(|r| r.language.clone()),
        duration: result.map(|r| r.duration),
        error: file.error.clone(),
        created_at: file.created_at.to_rfc3339(),
        started_at: file.started_at.map(|t| t.to_rfc3339()),
        completed_at: file.completed_at.map(|t| t.to_rfc3339()),
    }
}
