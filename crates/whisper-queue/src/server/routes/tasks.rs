//! Task status, result and queue endpoints
//!
//! Status endpoints deliberately omit transcript text so that pollers
//! stay cheap; the result endpoints carry the full payload.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::queue::QueueInfo;
use crate::server::state::AppState;
use crate::tasks::{
    all_results, completed_results, file_result, summarize, CompletedFileResult, FileResultView,
    FileStatus, OverallStatus, Task, TaskFile, TaskResults,
};

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub user_id: Option<String>,
    pub overall_status: OverallStatus,
    pub overall_progress: u8,
    pub total_files: usize,
    pub completed_files: usize,
    pub failed_files: usize,
    pub processing_files: usize,
    pub pending_files: usize,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub files: Vec<FileStatusView>,
}

/// Per-file status without the transcript payload
#[derive(Debug, Serialize)]
pub struct FileStatusView {
    pub file_index: usize,
    pub filename: String,
    pub status: FileStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FileStatusResponse {
    pub task_id: Uuid,
    pub file_index: usize,
    pub filename: String,
    pub status: FileStatus,
    pub progress: u8,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompletedResultsResponse {
    pub task_id: Uuid,
    pub overall_status: OverallStatus,
    pub completed_files: usize,
    pub total_files: usize,
    pub results: Vec<CompletedFileResult>,
}

#[derive(Debug, Serialize)]
pub struct QueueStateResponse {
    pub queue_length: usize,
    pub is_processing: bool,
    /// Status view of the task being worked on, null while idle
    pub current_task: Option<TaskStatusResponse>,
}

/// GET /task/status/:task_id - Full task status without transcripts
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskStatusResponse>> {
    let task = state.store().get(task_id)?;
    Ok(Json(status_response(&task)))
}

/// GET /task/status/:task_id/file/:file_index - Status of one file
pub async fn file_status(
    State(state): State<AppState>,
    Path((task_id, file_index)): Path<(Uuid, usize)>,
) -> Result<Json<FileStatusResponse>> {
    let task = state.store().get(task_id)?;
    let file = task.files.get(file_index).ok_or_else(|| {
        Error::not_found(format!("File {} not found in task {}", file_index, task_id))
    })?;

    let view = status_view(file);
    Ok(Json(FileStatusResponse {
        task_id,
        file_index: view.file_index,
        filename: view.filename,
        status: view.status,
        progress: view.progress,
        error: view.error,
        started_at: view.started_at,
        completed_at: view.completed_at,
    }))
}

/// GET /task/results/:task_id - Every file's result view, any state
pub async fn task_results(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskResults>> {
    let task = state.store().get(task_id)?;
    Ok(Json(all_results(&task)))
}

/// GET /task/results/:task_id/completed - Finished transcripts only,
/// available while siblings are still queued or running
pub async fn completed_task_results(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<CompletedResultsResponse>> {
    let task = state.store().get(task_id)?;
    let summary = summarize(&task.files);
    Ok(Json(CompletedResultsResponse {
        task_id: task.task_id,
        overall_status: summary.overall_status,
        completed_files: summary.completed,
        total_files: summary.total_files,
        results: completed_results(&task),
    }))
}

/// GET /task/results/:task_id/file/:file_index - One file's full view
pub async fn file_task_result(
    State(state): State<AppState>,
    Path((task_id, file_index)): Path<(Uuid, usize)>,
) -> Result<Json<FileResultView>> {
    let task = state.store().get(task_id)?;
    Ok(Json(file_result(&task, file_index)?))
}

/// GET /task/queue - Queue depth and the task currently running
pub async fn queue_state(State(state): State<AppState>) -> Json<QueueStateResponse> {
    let info = state.queue().info();
    // The slot can outlive its record (admin clear); a vanished id reads as null
    let current = info.current_task.and_then(|id| state.store().get(id).ok());
    Json(queue_response(info, current))
}

fn queue_response(info: QueueInfo, current: Option<Task>) -> QueueStateResponse {
    QueueStateResponse {
        queue_length: info.queue_length,
        is_processing: info.is_processing,
        current_task: current.as_ref().map(status_response),
    }
}

fn status_response(task: &Task) -> TaskStatusResponse {
    let summary = summarize(&task.files);
    TaskStatusResponse {
        task_id: task.task_id,
        user_id: task.user_id.clone(),
        overall_status: summary.overall_status,
        overall_progress: summary.overall_progress,
        total_files: summary.total_files,
        completed_files: summary.completed,
        failed_files: summary.failed,
        processing_files: summary.processing,
        pending_files: summary.pending,
        created_at: task.created_at.to_rfc3339(),
        completed_at: task.completed_at.map(|t| t.to_rfc3339()),
        files: task.files.iter().map(status_view).collect(),
    }
}

fn status_view(file: &TaskFile) -> FileStatusView {
    FileStatusView {
        file_index: file.file_index,
        filename: file.filename.clone(),
        status: file.status,
        progress: file.progress,
        error: file.error.clone(),
        started_at: file.started_at.map(|t| t.to_rfc3339()),
        completed_at: file.completed_at.map(|t| t.to_rfc3339()),
    }
}
