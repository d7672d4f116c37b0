//! Derived task status
//!
//! Nothing here is stored: every read recomputes the summary from the
//! per-file records so it can never drift out of sync with them.

use serde::{Deserialize, Serialize};

use super::record::{FileStatus, TaskFile};

/// Overall status of a task, derived from its file statuses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pending,
    Processing,
    Completed,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Pending => "pending",
            OverallStatus::Processing => "processing",
            OverallStatus::Completed => "completed",
        }
    }
}

/// Status counts and aggregate progress for one task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSummary {
    pub overall_status: OverallStatus,
    /// Mean of per-file progress, 0-100
    pub overall_progress: u8,
    pub total_files: usize,
    pub completed: usize,
    pub failed: usize,
    pub processing: usize,
    pub pending: usize,
}

/// Compute a task's summary from its files.
///
/// Overall status resolves top to bottom, first match wins:
/// 1. every file completed -> `completed`
/// 2. any file processing -> `processing`
/// 3. every file terminal with at least one failure -> `completed`
///    (the batch is done; failures are reported per file, not as an
///    overall failure)
/// 4. any file completed -> `processing` (work has started)
/// 5. otherwise -> `pending`
pub fn summarize(files: &[TaskFile]) -> TaskSummary {
    let total_files = files.len();
    let mut completed = 0;
    let mut failed = 0;
    let mut processing = 0;
    let mut pending = 0;

    for file in files {
        match file.status {
            FileStatus::Completed => completed += 1,
            FileStatus::Failed => failed += 1,
            FileStatus::Processing => processing += 1,
            FileStatus::Pending => pending += 1,
        }
    }

    let overall_status = if total_files > 0 && completed == total_files {
        OverallStatus::Completed
    } else if processing > 0 {
        OverallStatus::Processing
    } else if completed + failed == total_files && failed > 0 {
        OverallStatus::Completed
    } else if completed > 0 {
        OverallStatus::Processing
    } else {
        OverallStatus::Pending
    };

    let overall_progress = if total_files > 0 {
        (files.iter().map(|f| f.progress as usize).sum::<usize>() / total_files) as u8
    } else {
        0
    };

    TaskSummary {
        overall_status,
        overall_progress,
        total_files,
        completed,
        failed,
        processing,
        pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(index: usize, status: FileStatus, progress: u8) -> TaskFile {
        let now = chrono::Utc::now();
        TaskFile {
            file_index: index,
            filename: format!("f{}.mp3", index),
            size: 1024,
            content_type: "audio/mpeg".to_string(),
            path: PathBuf::from(format!("/tmp/f{}.mp3", index)),
            status,
            progress,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_all_completed() {
        let files = vec![
            file(0, FileStatus::Completed, 100),
            file(1, FileStatus::Completed, 100),
        ];
        let summary = summarize(&files);
        assert_eq!(summary.overall_status, OverallStatus::Completed);
        assert_eq!(summary.overall_progress, 100);
    }

    #[test]
    fn test_mixed_completed_failed_reports_completed() {
        let files = vec![
            file(0, FileStatus::Completed, 100),
            file(1, FileStatus::Failed, 40),
        ];
        let summary = summarize(&files);
        assert_eq!(summary.overall_status, OverallStatus::Completed);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_all_failed_reports_completed() {
        let files = vec![
            file(0, FileStatus::Failed, 10),
            file(1, FileStatus::Failed, 0),
        ];
        let summary = summarize(&files);
        assert_eq!(summary.overall_status, OverallStatus::Completed);
    }

    #[test]
    fn test_processing_takes_precedence_over_terminal_mix() {
        let files = vec![
            file(0, FileStatus::Completed, 100),
            file(1, FileStatus::Processing, 50),
        ];
        let summary = summarize(&files);
        assert_eq!(summary.overall_status, OverallStatus::Processing);
        assert_eq!(summary.overall_progress, 75);
    }

    #[test]
    fn test_all_pending() {
        let files = vec![
            file(0, FileStatus::Pending, 0),
            file(1, FileStatus::Pending, 0),
        ];
        let summary = summarize(&files);
        assert_eq!(summary.overall_status, OverallStatus::Pending);
        assert_eq!(summary.overall_progress, 0);
    }

    #[test]
    fn test_completed_with_pending_siblings_is_processing() {
        // One file done, the rest untouched: work has started but the
        // batch is not finished, so the task reads as processing.
        let files = vec![
            file(0, FileStatus::Completed, 100),
            file(1, FileStatus::Pending, 0),
        ];
        let summary = summarize(&files);
        assert_eq!(summary.overall_status, OverallStatus::Processing);
        assert_eq!(summary.overall_progress, 50);
    }

    #[test]
    fn test_failed_with_pending_siblings_is_pending() {
        // A lone failure with untouched siblings matches neither the
        // terminal rule nor the started rule.
        let files = vec![
            file(0, FileStatus::Failed, 20),
            file(1, FileStatus::Pending, 0),
        ];
        let summary = summarize(&files);
        assert_eq!(summary.overall_status, OverallStatus::Pending);
    }

    #[test]
    fn test_counts_partition_total() {
        let files = vec![
            file(0, FileStatus::Completed, 100),
            file(1, FileStatus::Failed, 30),
            file(2, FileStatus::Processing, 60),
            file(3, FileStatus::Pending, 0),
            file(4, FileStatus::Pending, 0),
        ];
        let summary = summarize(&files);
        assert_eq!(
            summary.completed + summary.failed + summary.processing + summary.pending,
            summary.total_files
        );
        assert_eq!(summary.total_files, 5);
        assert_eq!(summary.pending, 2);
    }

    #[test]
    fn test_empty_input() {
        let summary = summarize(&[]);
        assert_eq!(summary.overall_status, OverallStatus::Pending);
        assert_eq!(summary.overall_progress, 0);
        assert_eq!(summary.total_files, 0);
    }

    #[test]
    fn test_progress_mean_floors() {
        let files = vec![
            file(0, FileStatus::Processing, 33),
            file(1, FileStatus::Processing, 33),
            file(2, FileStatus::Processing, 34),
        ];
        assert_eq!(summarize(&files).overall_progress, 33);
    }
}
