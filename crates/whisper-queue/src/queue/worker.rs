//! Background worker that drains the task queue one task at a time

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::engine::TranscriptionEngine;
use crate::error::Result;
use crate::model::ModelSelector;
use crate::tasks::{FilePatch, TaskFile, TaskStore};

use super::scheduler::TaskQueue;

/// Worker that transcribes queued tasks in arrival order.
///
/// It owns the queue receiver, so there is exactly one of it and files
/// never overlap. Files within a task run in index order; a failed file
/// is recorded and the worker moves on to the next one.
pub struct QueueWorker {
    store: Arc<TaskStore>,
    queue: Arc<TaskQueue>,
    models: Arc<ModelSelector>,
    engine: Arc<dyn TranscriptionEngine>,
    cooldown: Duration,
}

impl QueueWorker {
    pub fn new(
        store: Arc<TaskStore>,
        queue: Arc<TaskQueue>,
        models: Arc<ModelSelector>,
        engine: Arc<dyn TranscriptionEngine>,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            models,
            engine,
            cooldown,
        }
    }

    /// Drain the queue until every sender is gone
    pub async fn run(self, mut receiver: mpsc::Receiver<Uuid>) {
        tracing::info!("Transcription worker started (engine: {})", self.engine.name());

        while let Some(task_id) = receiver.recv().await {
            self.queue.mark_started(task_id);

            if let Err(e) = self.process_task(task_id).await {
                tracing::warn!("Skipping task {}: {}", task_id, e);
            }

            self.queue.mark_finished();

            // Let the machine settle before loading the next task
            tokio::time::sleep(self.cooldown).await;
        }

        tracing::info!("Transcription worker stopped: queue closed");
    }

    async fn process_task(&self, task_id: Uuid) -> Result<()> {
        // Fails when the task was cleared while waiting in line
        let task = self.store.get(task_id)?;
        tracing::info!("Processing task {} ({} files)", task_id, task.files.len());

        for file in &task.files {
            self.process_file(task_id, file).await;
        }

        tracing::info!("Task {} finished", task_id);
        Ok(())
    }

    async fn process_file(&self, task_id: Uuid, file: &TaskFile) {
        let index = file.file_index;
        // Whatever model is active when a file starts stays with it to
        // the end; switches only affect files started afterwards
        let model = self.models.active();

        if let Err(e) = self.apply_patch(task_id, index, FilePatch::Started) {
            tracing::error!("[{}] Could not start file {}: {}", file.filename, index, e);
            return;
        }

        tracing::info!("[{}] Transcribing with model {}", file.filename, model);
        let started = std::time::Instant::now();

        let store = Arc::clone(&self.store);
        let progress_name = file.filename.clone();
        let on_progress = move |pct: u8| {
            // Progress is advisory; a dropped tick costs nothing
            if let Err(e) = store.update_file(task_id, index, FilePatch::Progress(pct)) {
                tracing::debug!("[{}] Progress update dropped: {}", progress_name, e);
            }
        };

        let outcome = self
            .engine
            .transcribe(&file.path, model, &on_progress)
            .await;
        let elapsed = started.elapsed();

        let patch = match outcome {
            Ok(transcript) => {
                tracing::info!(
                    "[{}] Completed in {:.1}s ({} chars, language {})",
                    file.filename,
                    elapsed.as_secs_f64(),
                    transcript.text.len(),
                    transcript.language
                );
                FilePatch::Completed(transcript)
            }
            Err(e) => {
                tracing::error!(
                    "[{}] Failed after {:.1}s: {}",
                    file.filename,
                    elapsed.as_secs_f64(),
                    e
                );
                FilePatch::Failed(e.to_string())
            }
        };

        if let Err(e) = self.apply_patch(task_id, index, patch) {
            tracing::error!("[{}] Could not record outcome: {}", file.filename, e);
            // Leave a terminal record behind if the file still exists
            let _ = self
                .store
                .update_file(task_id, index, FilePatch::Failed(format!("Store error: {}", e)));
        }

        // Spool files are one-shot; drop them once the file is terminal
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            tracing::debug!("[{}] Spool cleanup: {}", file.filename, e);
        }
    }

    /// Apply a transition, retrying once before giving up
    fn apply_patch(&self, task_id: Uuid, file_index: usize, patch: FilePatch) -> Result<()> {
        if let Err(first) = self.store.update_file(task_id, file_index, patch.clone()) {
            tracing::warn!(
                "Retrying update for task {} file {}: {}",
                task_id,
                file_index,
                first
            );
            self.store.update_file(task_id, file_index, patch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProgressFn;
    use crate::error::Error;
    use crate::hardware::HardwareInfo;
    use crate::model::WhisperModel;
    use crate::tasks::{completed_results, FileStatus, NewTaskFile, OverallStatus, summarize, Transcript};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Engine whose behavior is keyed off the media file name:
    /// names starting with "fail" error out, gated names block until
    /// the test releases them, everything else succeeds immediately.
    struct ScriptedEngine {
        calls: Mutex<Vec<(String, WhisperModel)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        gates: Mutex<HashMap<String, Arc<Notify>>>,
    }

    impl ScriptedEngine {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                gates: Mutex::new(HashMap::new()),
            })
        }

        /// Make the engine block on `filename` until the handle fires
        fn gate(&self, filename: &str) -> Arc<Notify> {
            let notify = Arc::new(Notify::new());
            self.gates
                .lock()
                .insert(filename.to_string(), notify.clone());
            notify
        }

        fn calls(&self) -> Vec<(String, WhisperModel)> {
            self.calls.lock().clone()
        }

        fn max_concurrency(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranscriptionEngine for ScriptedEngine {
        async fn transcribe(
            &self,
            media_path: &Path,
            model: WhisperModel,
            on_progress: ProgressFn<'_>,
        ) -> crate::error::Result<Transcript> {
            let filename = media_path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            self.calls.lock().push((filename.clone(), model));

            tokio::task::yield_now().await;

            let gate = self.gates.lock().get(&filename).cloned();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            let result = if filename.starts_with("fail") {
                on_progress(60);
                Err(Error::engine("scripted failure"))
            } else {
                on_progress(30);
                on_progress(80);
                Ok(Transcript {
                    text: format!("text of {}", filename),
                    language: "en".to_string(),
                    duration: 2.0,
                })
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Harness {
        store: Arc<TaskStore>,
        queue: Arc<TaskQueue>,
        models: Arc<ModelSelector>,
        engine: Arc<ScriptedEngine>,
    }

    fn spawn_worker() -> Harness {
        let store = Arc::new(TaskStore::in_memory());
        let (queue, receiver) = TaskQueue::new(100);
        let queue = Arc::new(queue);
        let models = Arc::new(ModelSelector::new(HardwareInfo {
            total_ram_bytes: 32 * 1024 * 1024 * 1024,
            cpu_cores: 8,
            gpu: None,
        }));
        let engine = ScriptedEngine::new();

        let worker = QueueWorker::new(
            store.clone(),
            queue.clone(),
            models.clone(),
            engine.clone() as Arc<dyn TranscriptionEngine>,
            Duration::from_millis(0),
        );
        tokio::spawn(worker.run(receiver));

        Harness {
            store,
            queue,
            models,
            engine,
        }
    }

    fn submit(h: &Harness, names: &[&str]) -> Uuid {
        let files = names
            .iter()
            .map(|n| NewTaskFile {
                filename: n.to_string(),
                size: 128,
                content_type: "audio/mpeg".to_string(),
                path: PathBuf::from(format!("/tmp/spool-test/{}", n)),
            })
            .collect();
        let task = h.store.create(files, None).unwrap();
        h.queue.enqueue(task.task_id).unwrap();
        task.task_id
    }

    async fn wait_for<F: Fn() -> bool>(cond: F, what: &str) {
        for _ in 0..1000 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    fn task_done(h: &Harness, id: Uuid) -> bool {
        h.store
            .get(id)
            .map(|t| t.completed_at.is_some())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_tasks_run_in_submission_order() {
        let h = spawn_worker();

        let a = submit(&h, &["a.mp3"]);
        let b = submit(&h, &["b.mp3"]);
        let c = submit(&h, &["c.mp3"]);

        wait_for(
            || task_done(&h, a) && task_done(&h, b) && task_done(&h, c),
            "all three tasks",
        )
        .await;

        let order: Vec<String> = h.engine.calls().into_iter().map(|(f, _)| f).collect();
        assert_eq!(order, vec!["a.mp3", "b.mp3", "c.mp3"]);
    }

    #[tokio::test]
    async fn test_never_more_than_one_file_in_flight() {
        let h = spawn_worker();

        let a = submit(&h, &["a1.mp3", "a2.mp3"]);
        let b = submit(&h, &["b1.mp3", "b2.mp3"]);

        wait_for(|| task_done(&h, a) && task_done(&h, b), "both tasks").await;

        assert_eq!(h.engine.max_concurrency(), 1);
        assert_eq!(h.engine.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_finished_files_are_readable_mid_task() {
        let h = spawn_worker();
        let release = h.engine.gate("slow.mp3");

        let id = submit(&h, &["quick.mp3", "slow.mp3"]);

        wait_for(
            || {
                h.store
                    .get(id)
                    .map(|t| t.files[0].status == FileStatus::Completed)
                    .unwrap_or(false)
            },
            "first file to complete",
        )
        .await;

        // Second file is still held open by the gate: partial results
        // must already be served
        let task = h.store.get(id).unwrap();
        let done = completed_results(&task);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].file_index, 0);
        assert_eq!(done[0].transcription, "text of quick.mp3");

        let summary = summarize(&task.files);
        assert_eq!(summary.overall_status, OverallStatus::Processing);
        assert!(task.completed_at.is_none());

        release.notify_one();
        wait_for(|| task_done(&h, id), "whole task").await;

        let task = h.store.get(id).unwrap();
        assert_eq!(completed_results(&task).len(), 2);
        assert_eq!(summarize(&task.files).overall_status, OverallStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_file_keeps_its_progress_and_error() {
        let h = spawn_worker();

        let id = submit(&h, &["fail.mp3", "after.mp3"]);
        wait_for(|| task_done(&h, id), "task").await;

        let task = h.store.get(id).unwrap();
        let failed = &task.files[0];
        assert_eq!(failed.status, FileStatus::Failed);
        assert_eq!(failed.progress, 60);
        assert!(failed.error.as_deref().unwrap().contains("scripted failure"));
        assert!(failed.completed_at.is_some());

        // The sibling after the failure still ran
        assert_eq!(task.files[1].status, FileStatus::Completed);

        // A finished batch with failures still reads as completed
        assert_eq!(summarize(&task.files).overall_status, OverallStatus::Completed);
    }

    #[tokio::test]
    async fn test_model_switch_applies_from_next_file_started() {
        let h = spawn_worker();
        let release = h.engine.gate("first.mp3");

        let id = submit(&h, &["first.mp3", "second.mp3"]);

        wait_for(|| !h.engine.calls().is_empty(), "engine pickup").await;

        // Switch while the first file is mid-transcription
        h.models.set_model("small").unwrap();
        release.notify_one();

        wait_for(|| task_done(&h, id), "task").await;

        let calls = h.engine.calls();
        assert_eq!(calls[0], ("first.mp3".to_string(), WhisperModel::Base));
        assert_eq!(calls[1], ("second.mp3".to_string(), WhisperModel::Small));
    }

    #[tokio::test]
    async fn test_unknown_task_id_is_skipped() {
        let h = spawn_worker();

        // Simulates a task cleared while it sat in the queue
        h.queue.enqueue(Uuid::new_v4()).unwrap();
        let real = submit(&h, &["real.mp3"]);

        wait_for(|| task_done(&h, real), "real task").await;

        let order: Vec<String> = h.engine.calls().into_iter().map(|(f, _)| f).collect();
        assert_eq!(order, vec!["real.mp3"]);
    }

    #[tokio::test]
    async fn test_queue_info_follows_the_worker() {
        let h = spawn_worker();
        let release = h.engine.gate("held.mp3");

        let a = submit(&h, &["held.mp3"]);
        let b = submit(&h, &["next.mp3"]);

        wait_for(|| h.queue.is_processing(), "worker pickup").await;

        let info = h.queue.info();
        assert_eq!(info.current_task, Some(a));
        assert_eq!(info.queue_length, 1);

        release.notify_one();
        wait_for(|| task_done(&h, b) && !h.queue.is_processing(), "drain").await;

        let info = h.queue.info();
        assert!(info.current_task.is_none());
        assert_eq!(info.queue_length, 0);
    }
}
