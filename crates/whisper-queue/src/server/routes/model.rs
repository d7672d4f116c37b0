//! Model selection endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::WhisperModel;
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetModelRequest {
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct SetModelResponse {
    pub success: bool,
    pub message: String,
    pub previous_model: String,
    pub active_model: String,
    pub gpu_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub active_model: String,
    pub gpu_enabled: bool,
    pub gpu_name: Option<String>,
    pub available_models: Vec<ModelEntry>,
}

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub name: String,
    pub min_memory_gb: f64,
    pub downloaded: bool,
}

/// POST /model/set - Switch the active model.
///
/// Files already started keep the model they started with; the switch
/// applies from the next file the worker picks up.
pub async fn set_model(
    State(state): State<AppState>,
    Json(request): Json<SetModelRequest>,
) -> Result<Json<SetModelResponse>> {
    let swap = state.models().set_model(&request.model)?;
    Ok(Json(SetModelResponse {
        success: true,
        message: format!(
            "Model set to '{}', applies from the next file started",
            swap.active
        ),
        previous_model: swap.previous.to_string(),
        active_model: swap.active.to_string(),
        gpu_enabled: state.hardware().has_gpu(),
    }))
}

/// GET /model - Active model plus what this host could run
pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfoResponse> {
    let hardware = state.hardware();
    let available_models = WhisperModel::ALL
        .into_iter()
        .map(|model| ModelEntry {
            name: model.to_string(),
            min_memory_gb: model.min_memory_gb(),
            downloaded: state.engine().model_path(model).exists(),
        })
        .collect();

    Json(ModelInfoResponse {
        active_model: state.models().active().to_string(),
        gpu_enabled: hardware.has_gpu(),
        gpu_name: hardware.gpu.as_ref().map(|gpu| gpu.name.clone()),
        available_models,
    })
}
