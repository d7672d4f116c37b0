//! whisper-queue: Batch media transcription service with a FIFO task queue
//!
//! This crate provides an HTTP service that accepts batches of media files,
//! transcribes them one at a time through whisper.cpp, and exposes per-file
//! progress and results while the batch is still running. Tasks live in an
//! in-memory store mirrored to SQLite; a single queue worker drains
//! submissions in arrival order.

pub mod config;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod model;
pub mod queue;
pub mod server;
pub mod storage;
pub mod tasks;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use model::{ModelSelector, WhisperModel};
pub use queue::{QueueInfo, TaskQueue};
pub use tasks::{
    FileStatus, OverallStatus, Task, TaskFile, TaskStore, TaskSummary, Transcript,
};
