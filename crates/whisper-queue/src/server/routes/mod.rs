//! API route handlers

pub mod admin;
pub mod model;
pub mod tasks;
pub mod transcribe;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::server::state::AppState;

/// Build the API route table.
///
/// The body limit is raised on the submission route only; every other
/// route keeps the small axum default.
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/transcribe",
            post(transcribe::submit_task).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/task/status/:task_id", get(tasks::task_status))
        .route(
            "/task/status/:task_id/file/:file_index",
            get(tasks::file_status),
        )
        .route("/task/results/:task_id", get(tasks::task_results))
        .route(
            "/task/results/:task_id/completed",
            get(tasks::completed_task_results),
        )
        .route(
            "/task/results/:task_id/file/:file_index",
            get(tasks::file_task_result),
        )
        .route("/task/queue", get(tasks::queue_state))
        .route("/model/set", post(model::set_model))
        .route("/model", get(model::model_info))
        .route("/admin/tasks", delete(admin::clear_tasks))
}
