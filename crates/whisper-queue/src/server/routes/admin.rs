//! Administrative endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::Result;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct ClearTasksResponse {
    pub success: bool,
    pub message: String,
    pub deleted_tasks: usize,
    pub deleted_files: usize,
}

/// DELETE /admin/tasks - Drop every task and sweep the spool.
///
/// Ids already sitting in the queue are skipped by the worker once
/// their tasks are gone.
pub async fn clear_tasks(State(state): State<AppState>) -> Result<Json<ClearTasksResponse>> {
    let spool_paths = state.store().spool_paths();
    let stats = state.store().clear_all()?;

    for path in &spool_paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::debug!("Spool cleanup for {}: {}", path.display(), e);
        }
    }

    tracing::warn!(
        "Admin clear dropped {} task(s) and {} file(s)",
        stats.deleted_tasks,
        stats.deleted_files
    );

    Ok(Json(ClearTasksResponse {
        success: true,
        message: format!(
            "Cleared {} task(s) and {} file(s)",
            stats.deleted_tasks, stats.deleted_files
        ),
        deleted_tasks: stats.deleted_tasks,
        deleted_files: stats.deleted_files,
    }))
}
