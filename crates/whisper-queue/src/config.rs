//! Configuration for the transcription queue service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload handling configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// Transcription engine configuration
    #[serde(default)]
    pub engine: EngineConfig,
    /// Task storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
}

impl AppConfig {
    /// Load configuration from the path in `WHISPER_QUEUE_CONFIG`, falling
    /// back to `whisper-queue.toml` in the working directory, falling back
    /// to defaults when neither exists.
    pub fn load() -> Result<Self> {
        let path = std::env::var("WHISPER_QUEUE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("whisper-queue.toml"));

        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size in bytes (default: 1GB, sized for uploads)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            max_upload_size: 1024 * 1024 * 1024, // 1GB
        }
    }
}

/// Upload handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory uploaded files are spooled to while they wait in the queue
    pub spool_dir: PathBuf,
    /// Maximum number of files per batch (default: 5)
    pub max_files_per_batch: usize,
    /// Maximum size of a single file in bytes (default: 1GB)
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            spool_dir: std::env::temp_dir().join("whisper-queue"),
            max_files_per_batch: 5,
            max_file_size: 1024 * 1024 * 1024, // 1GB
        }
    }
}

/// Transcription engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// whisper.cpp binary (resolved through PATH when not absolute)
    pub binary: PathBuf,
    /// Directory holding the GGML model weights
    pub model_dir: PathBuf,
    /// Spoken-language hint passed to the engine (None = auto-detect)
    pub language: Option<String>,
    /// Worker threads for the engine (None = CPU count, capped at 8)
    pub threads: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("whisper-cli"),
            model_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("whisper-queue")
                .join("models"),
            language: None,
            threads: None,
        }
    }
}

/// Task storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub database_path: PathBuf,
    /// Drop all tasks from previous sessions at startup (default: true)
    pub clear_on_startup: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_local_dir()
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")))
                .join("whisper-queue")
                .join("tasks.db"),
            clear_on_startup: true,
        }
    }
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of the pending-task channel (default: 1000)
    pub capacity: usize,
    /// Pause between finished tasks in milliseconds (default: 500)
    pub cooldown_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            cooldown_ms: 500,
        }
    }
}
