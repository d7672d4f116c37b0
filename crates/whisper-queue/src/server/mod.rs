//! HTTP server for the transcription queue

pub mod routes;
pub mod state;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use state::AppState;

/// The transcription queue API server
pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    /// Create the server, its task store and its queue worker
    pub async fn new(config: AppConfig) -> Result<Self> {
        let state = AppState::new(config.clone()).await?;
        Ok(Self { config, state })
    }

    /// Shared application state
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the axum router with all routes and middleware
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_check))
            .merge(routes::api_routes(self.config.server.max_upload_size))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new());

        if self.config.server.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Bind and serve until shutdown
    pub async fn start(&self) -> Result<()> {
        let addr = self.address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::internal(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!("Server listening on http://{}", addr);

        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// The address this server binds to
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// GET /health - Liveness plus a small operational snapshot
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let queue = state.queue();
    Json(health_body(
        &state.models().active().to_string(),
        state.hardware().has_gpu(),
        queue.queue_length(),
        queue.is_processing(),
        state.uptime_seconds(),
    ))
}

fn health_body(
    model: &str,
    gpu: bool,
    queue_length: usize,
    is_processing: bool,
    uptime_seconds: u64,
) -> Value {
    json!({
        "status": "normal",
        "model": model,
        "gpu": gpu,
        "queue_length": queue_length,
        "is_processing": is_processing,
        "uptime_seconds": uptime_seconds,
        "api_version": env!("CARGO_PKG_VERSION"),
    })
}
