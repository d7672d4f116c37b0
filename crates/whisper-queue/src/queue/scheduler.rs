//! FIFO scheduling of tasks onto the single transcription worker

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Snapshot of the scheduler for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    /// Tasks waiting behind the one currently running
    pub queue_length: usize,
    pub is_processing: bool,
    pub current_task: Option<Uuid>,
}

/// Hands submitted tasks to the worker in arrival order.
///
/// The channel is the queue; `depth` mirrors how many task ids sit in it
/// so status reads never have to touch the channel. One receiver exists
/// and it is owned by the worker, so tasks run strictly one at a time.
pub struct TaskQueue {
    sender: mpsc::Sender<Uuid>,
    depth: AtomicUsize,
    current: RwLock<Option<Uuid>>,
    processing: AtomicBool,
}

impl TaskQueue {
    /// Create the queue and the receiver the worker will drain
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let queue = Self {
            sender,
            depth: AtomicUsize::new(0),
            current: RwLock::new(None),
            processing: AtomicBool::new(false),
        };

        (queue, receiver)
    }

    /// Submit a task id; returns its position in line (1 = next up).
    ///
    /// Never blocks the request path: a full channel is reported as an
    /// error instead of waiting for the worker to catch up.
    pub fn enqueue(&self, task_id: Uuid) -> Result<usize> {
        // Counted before the send; the send wakes the worker, whose
        // decrement must find this id already included.
        let position = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        match self.sender.try_send(task_id) {
            Ok(()) => {
                tracing::info!("Task {} queued at position {}", task_id, position);
                Ok(position)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Err(Error::queue_full("Queue is full, try again later".to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Err(Error::internal("Queue worker is not running".to_string()))
            }
        }
    }

    /// Worker picked up a task
    pub fn mark_started(&self, task_id: Uuid) {
        self.depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| {
                Some(d.saturating_sub(1))
            })
            .ok();
        *self.current.write() = Some(task_id);
        self.processing.store(true, Ordering::SeqCst);
    }

    /// Worker finished the task it was holding
    pub fn mark_finished(&self) {
        *self.current.write() = None;
        self.processing.store(false, Ordering::SeqCst);
    }

    pub fn queue_length(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    pub fn current_task(&self) -> Option<Uuid> {
        *self.current.read()
    }

    pub fn info(&self) -> QueueInfo {
        QueueInfo {
            queue_length: self.queue_length(),
            is_processing: self.is_processing(),
            current_task: self.current_task(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_reports_position() {
        let (queue, _receiver) = TaskQueue::new(10);

        assert_eq!(queue.enqueue(Uuid::new_v4()).unwrap(), 1);
        assert_eq!(queue.enqueue(Uuid::new_v4()).unwrap(), 2);
        assert_eq!(queue.queue_length(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_full_queue_is_rejected_not_blocked() {
        let (queue, _receiver) = TaskQueue::new(1);

        queue.enqueue(Uuid::new_v4()).unwrap();
        let err = queue.enqueue(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, Error::QueueFull(_)));
        // The accepted task is still counted
        assert_eq!(queue.queue_length(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_gone() {
        let (queue, receiver) = TaskQueue::new(4);
        drop(receiver);

        let err = queue.enqueue(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        // The rejected id is not counted
        assert_eq!(queue.queue_length(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_depth_settles_to_zero_under_concurrent_handoff() {
        use std::sync::Arc;
        use std::time::Duration;

        let (queue, mut receiver) = TaskQueue::new(64);
        let queue = Arc::new(queue);

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                while let Some(id) = receiver.recv().await {
                    queue.mark_started(id);
                    queue.mark_finished();
                }
            })
        };

        for _ in 0..50 {
            queue.enqueue(Uuid::new_v4()).unwrap();
        }

        for _ in 0..1000 {
            if queue.queue_length() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        // Every pickup pairs with exactly one enqueue; no drift survives
        assert_eq!(queue.queue_length(), 0);
        consumer.abort();
    }

    #[tokio::test]
    async fn test_ids_come_out_in_arrival_order() {
        let (queue, mut receiver) = TaskQueue::new(10);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        queue.enqueue(a).unwrap();
        queue.enqueue(b).unwrap();
        queue.enqueue(c).unwrap();

        assert_eq!(receiver.recv().await, Some(a));
        assert_eq!(receiver.recv().await, Some(b));
        assert_eq!(receiver.recv().await, Some(c));
    }

    #[tokio::test]
    async fn test_info_tracks_worker_lifecycle() {
        let (queue, mut receiver) = TaskQueue::new(10);
        let task_id = Uuid::new_v4();
        queue.enqueue(task_id).unwrap();
        queue.enqueue(Uuid::new_v4()).unwrap();

        let picked = receiver.recv().await.unwrap();
        queue.mark_started(picked);

        let info = queue.info();
        assert_eq!(info.queue_length, 1);
        assert!(info.is_processing);
        assert_eq!(info.current_task, Some(task_id));

        queue.mark_finished();
        let info = queue.info();
        assert!(!info.is_processing);
        assert!(info.current_task.is_none());
    }
}
