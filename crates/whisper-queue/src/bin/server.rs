//! Transcription queue server binary
//!
//! Run with: cargo run -p whisper-queue --bin whisper-queue-server

use whisper_queue::{config::AppConfig, server::ApiServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper_queue=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                     Whisper Queue                         ║
║          Batch Media Transcription Service                ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration
    let config = AppConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Spool directory: {}", config.upload.spool_dir.display());
    tracing::info!("  - Database: {}", config.storage.database_path.display());
    tracing::info!("  - Model directory: {}", config.engine.model_dir.display());
    tracing::info!("  - Queue capacity: {}", config.queue.capacity);
    tracing::info!("  - Max files per task: {}", config.upload.max_files_per_batch);

    // Create the server; this spawns the queue worker
    let server = ApiServer::new(config).await?;

    // Check the transcription toolchain
    let engine = server.state().engine();
    if engine.binary_available() {
        tracing::info!("whisper-cli binary found: {}", engine.binary().display());
    } else {
        tracing::warn!("whisper-cli not runnable at '{}'", engine.binary().display());
        tracing::warn!("Transcription will fail until it is installed:");
        tracing::warn!("  1. Install: brew install whisper-cpp (or build whisper.cpp)");
        tracing::warn!("  2. Point engine.binary at it in whisper-queue.toml");
    }
    let models = engine.available_models();
    if models.is_empty() {
        tracing::warn!(
            "No GGML models under {}; download one, e.g.:",
            engine.model_dir().display()
        );
        tracing::warn!(
            "  curl -LO https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin"
        );
    } else {
        let names: Vec<String> = models.iter().map(|m| m.to_string()).collect();
        tracing::info!("Models on disk: {}", names.join(", "));
    }

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /transcribe                             - Submit media files");
    println!("  GET    /task/status/:task_id                   - Task status");
    println!("  GET    /task/status/:task_id/file/:file_index  - Single file status");
    println!("  GET    /task/results/:task_id                  - All results");
    println!("  GET    /task/results/:task_id/completed        - Finished results only");
    println!("  GET    /task/results/:task_id/file/:file_index - Single file result");
    println!("  GET    /task/queue                             - Queue state");
    println!("  POST   /model/set                              - Switch model");
    println!("  GET    /model                                  - Model info");
    println!("  DELETE /admin/tasks                            - Clear all tasks");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
