//! Application state for the transcription server

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::engine::{TranscriptionEngine, WhisperCli};
use crate::error::Result;
use crate::hardware::HardwareInfo;
use crate::model::ModelSelector;
use crate::queue::{QueueWorker, TaskQueue};
use crate::storage::TaskDb;
use crate::tasks::TaskStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: AppConfig,
    /// Task records, memory-first with a SQLite mirror
    store: Arc<TaskStore>,
    /// FIFO scheduler feeding the single worker
    queue: Arc<TaskQueue>,
    /// Active model and switch validation
    models: Arc<ModelSelector>,
    /// whisper.cpp adapter, also probed for health reporting
    engine: Arc<WhisperCli>,
    /// Host snapshot taken at startup
    hardware: HardwareInfo,
    /// Process start, for uptime reporting
    started_at: Instant,
}

impl AppState {
    /// Create new application state and start the background worker
    pub async fn new(config: AppConfig) -> Result<Self> {
        tracing::info!("Initializing transcription service state...");

        // Spool directory must exist before the first upload lands
        std::fs::create_dir_all(&config.upload.spool_dir)?;

        let database = Arc::new(TaskDb::new(&config.storage.database_path)?);
        tracing::info!(
            "Task database ready at {}",
            config.storage.database_path.display()
        );

        if config.storage.clear_on_startup {
            let (tasks, files) = database.clear_all()?;
            if tasks > 0 {
                tracing::info!(
                    "Dropped {} task(s) and {} file record(s) left over from a previous run",
                    tasks,
                    files
                );
            }
        }

        let hardware = HardwareInfo::detect();
        let models = Arc::new(ModelSelector::new(hardware.clone()));
        let engine = Arc::new(WhisperCli::new(&config.engine));
        let store = Arc::new(TaskStore::new(database));

        let (queue, receiver) = TaskQueue::new(config.queue.capacity);
        let queue = Arc::new(queue);

        // Single worker: the receiver moves into it, so there can never
        // be a second one draining the same queue
        let worker = QueueWorker::new(
            store.clone(),
            queue.clone(),
            models.clone(),
            engine.clone() as Arc<dyn TranscriptionEngine>,
            Duration::from_millis(config.queue.cooldown_ms),
        );
        tokio::spawn(worker.run(receiver));
        tracing::info!("Queue worker started (capacity: {})", config.queue.capacity);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                queue,
                models,
                engine,
                hardware,
                started_at: Instant::now(),
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get the task store
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.inner.store
    }

    /// Get the task queue
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.inner.queue
    }

    /// Get the model selector
    pub fn models(&self) -> &Arc<ModelSelector> {
        &self.inner.models
    }

    /// Get the transcription engine
    pub fn engine(&self) -> &Arc<WhisperCli> {
        &self.inner.engine
    }

    /// Get the hardware snapshot
    pub fn hardware(&self) -> &HardwareInfo {
        &self.inner.hardware
    }

    /// Seconds since the process came up
    pub fn uptime_seconds(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}
