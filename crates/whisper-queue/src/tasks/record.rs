//! Task and file records for batch transcription tracking
//!
//! A task is created atomically with all of its files and never grows or
//! shrinks afterwards; the worker advances each file through its lifecycle
//! one legal transition at a time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Most files a single task may carry
pub const MAX_FILES_PER_TASK: usize = 5;

/// Lifecycle status of a single file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    /// True once the file can never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for FileStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(FileStatus::Pending),
            "processing" => Ok(FileStatus::Processing),
            "completed" => Ok(FileStatus::Completed),
            "failed" => Ok(FileStatus::Failed),
            other => Err(Error::store(format!("Unknown file status: {}", other))),
        }
    }
}

/// Output of a successful transcription
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    /// Full transcription text
    pub text: String,
    /// Detected (or hinted) spoken language code
    pub language: String,
    /// Media duration in seconds
    pub duration: f64,
}

/// An accepted upload handed over by the request layer
#[derive(Debug, Clone)]
pub struct NewTaskFile {
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    /// Spool location of the uploaded bytes
    pub path: PathBuf,
}

/// One legal mutation of a [`TaskFile`]
#[derive(Debug, Clone)]
pub enum FilePatch {
    /// pending -> processing; records the start time
    Started,
    /// Progress report while processing, 0-100
    Progress(u8),
    /// processing -> completed with the engine result
    Completed(Transcript),
    /// processing -> failed with the engine (or store) error message
    Failed(String),
}

/// Per-file tracking record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFile {
    /// Position within the task (immutable)
    pub file_index: usize,
    /// Original filename as submitted
    pub filename: String,
    /// File size in bytes
    pub size: u64,
    /// MIME type captured at submission
    pub content_type: String,
    /// Spool location of the uploaded bytes
    pub path: PathBuf,
    /// Lifecycle status
    pub status: FileStatus,
    /// Progress 0-100; non-decreasing while processing, 100 once completed
    pub progress: u8,
    /// Transcription result, set once on completion
    pub result: Option<Transcript>,
    /// Error message, set once on failure
    pub error: Option<String>,
    /// Task creation time
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Set on entering processing
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Set on entering a terminal status
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TaskFile {
    fn new(file_index: usize, file: NewTaskFile, created_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            file_index,
            filename: file.filename,
            size: file.size,
            content_type: file.content_type,
            path: file.path,
            status: FileStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply one transition, rejecting anything the lifecycle does not allow.
    ///
    /// Terminal files never change again; progress reports are only legal
    /// while processing and are clamped to stay non-decreasing.
    pub fn apply(&mut self, patch: FilePatch) -> Result<()> {
        match patch {
            FilePatch::Started => {
                if self.status != FileStatus::Pending {
                    return Err(Error::store(format!(
                        "File {} cannot start from status {}",
                        self.file_index,
                        self.status.as_str()
                    )));
                }
                self.status = FileStatus::Processing;
                self.started_at = Some(chrono::Utc::now());
            }
            FilePatch::Progress(pct) => {
                if self.status != FileStatus::Processing {
                    return Err(Error::store(format!(
                        "File {} cannot report progress in status {}",
                        self.file_index,
                        self.status.as_str()
                    )));
                }
                self.progress = self.progress.max(pct.min(100));
            }
            FilePatch::Completed(transcript) => {
                if self.status != FileStatus::Processing {
                    return Err(Error::store(format!(
                        "File {} cannot complete from status {}",
                        self.file_index,
                        self.status.as_str()
                    )));
                }
                self.status = FileStatus::Completed;
                self.progress = 100;
                self.result = Some(transcript);
                self.completed_at = Some(chrono::Utc::now());
            }
            FilePatch::Failed(message) => {
                if self.status != FileStatus::Processing {
                    return Err(Error::store(format!(
                        "File {} cannot fail from status {}",
                        self.file_index,
                        self.status.as_str()
                    )));
                }
                // Progress stays frozen at its last reported value
                self.status = FileStatus::Failed;
                self.error = Some(message);
                self.completed_at = Some(chrono::Utc::now());
            }
        }
        Ok(())
    }
}

/// A batch of files submitted together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    /// Optional caller-supplied label
    pub user_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Set exactly once, when the last file reaches a terminal status
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Bumped on every mutation; lets pollers skip unchanged reads
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// Files in submission order, indexed 0..n-1
    pub files: Vec<TaskFile>,
}

impl Task {
    /// Build a task with all files pending. Fails when the batch is empty
    /// or larger than [`MAX_FILES_PER_TASK`].
    pub fn new(files: Vec<NewTaskFile>, user_id: Option<String>) -> Result<Self> {
        if files.is_empty() {
            return Err(Error::validation("Task requires at least one file"));
        }
        if files.len() > MAX_FILES_PER_TASK {
            return Err(Error::validation(format!(
                "Task accepts at most {} files, got {}",
                MAX_FILES_PER_TASK,
                files.len()
            )));
        }

        let now = chrono::Utc::now();
        let files = files
            .into_iter()
            .enumerate()
            .map(|(index, file)| TaskFile::new(index, file, now))
            .collect();

        Ok(Self {
            task_id: Uuid::new_v4(),
            user_id,
            created_at: now,
            completed_at: None,
            updated_at: now,
            files,
        })
    }

    /// Look up a file by its index
    pub fn file(&self, file_index: usize) -> Option<&TaskFile> {
        self.files.get(file_index)
    }

    /// True once every file is terminal
    pub fn all_terminal(&self) -> bool {
        self.files.iter().all(|f| f.status.is_terminal())
    }

    /// True while any file of this task is mid-transcription
    pub fn any_processing(&self) -> bool {
        self.files.iter().any(|f| f.status == FileStatus::Processing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_file(name: &str) -> NewTaskFile {
        NewTaskFile {
            filename: name.to_string(),
            size: 1024,
            content_type: "audio/mpeg".to_string(),
            path: PathBuf::from(format!("/tmp/{}", name)),
        }
    }

    fn transcript() -> Transcript {
        Transcript {
            text: "hello world".to_string(),
            language: "en".to_string(),
            duration: 12.5,
        }
    }

    #[test]
    fn test_task_creation_bounds() {
        assert!(Task::new(vec![], None).is_err());

        let six = (0..6).map(|i| new_file(&format!("f{}.mp3", i))).collect();
        assert!(Task::new(six, None).is_err());

        for n in 1..=5 {
            let files = (0..n).map(|i| new_file(&format!("f{}.mp3", i))).collect();
            let task = Task::new(files, None).unwrap();
            assert_eq!(task.files.len(), n);
            for (i, file) in task.files.iter().enumerate() {
                assert_eq!(file.file_index, i);
                assert_eq!(file.status, FileStatus::Pending);
                assert_eq!(file.progress, 0);
            }
        }
    }

    #[test]
    fn test_file_lifecycle_happy_path() {
        let mut task = Task::new(vec![new_file("a.mp3")], None).unwrap();
        let file = &mut task.files[0];

        assert!(file.started_at.is_none());
        file.apply(FilePatch::Started).unwrap();
        assert_eq!(file.status, FileStatus::Processing);
        assert!(file.started_at.is_some());

        file.apply(FilePatch::Progress(40)).unwrap();
        assert_eq!(file.progress, 40);

        file.apply(FilePatch::Completed(transcript())).unwrap();
        assert_eq!(file.status, FileStatus::Completed);
        assert_eq!(file.progress, 100);
        assert_eq!(file.result.as_ref().unwrap().language, "en");
        assert!(file.completed_at.is_some());
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut task = Task::new(vec![new_file("a.mp3")], None).unwrap();
        let file = &mut task.files[0];
        file.apply(FilePatch::Started).unwrap();

        file.apply(FilePatch::Progress(60)).unwrap();
        file.apply(FilePatch::Progress(30)).unwrap();
        assert_eq!(file.progress, 60, "progress never goes backwards");

        file.apply(FilePatch::Progress(250)).unwrap();
        assert_eq!(file.progress, 100, "progress caps at 100");
    }

    #[test]
    fn test_progress_requires_processing() {
        let mut task = Task::new(vec![new_file("a.mp3")], None).unwrap();
        let file = &mut task.files[0];

        assert!(file.apply(FilePatch::Progress(10)).is_err());

        file.apply(FilePatch::Started).unwrap();
        file.apply(FilePatch::Completed(transcript())).unwrap();
        assert!(file.apply(FilePatch::Progress(10)).is_err());
    }

    #[test]
    fn test_terminal_states_are_sealed() {
        let mut task = Task::new(vec![new_file("a.mp3"), new_file("b.mp3")], None).unwrap();

        let done = &mut task.files[0];
        done.apply(FilePatch::Started).unwrap();
        done.apply(FilePatch::Completed(transcript())).unwrap();
        assert!(done.apply(FilePatch::Started).is_err());
        assert!(done.apply(FilePatch::Failed("late".to_string())).is_err());

        let failed = &mut task.files[1];
        failed.apply(FilePatch::Started).unwrap();
        failed.apply(FilePatch::Progress(35)).unwrap();
        failed.apply(FilePatch::Failed("decode error".to_string())).unwrap();
        assert_eq!(failed.progress, 35, "failure freezes progress at its last value");
        assert!(failed.apply(FilePatch::Completed(transcript())).is_err());
    }

    #[test]
    fn test_failure_requires_processing() {
        let mut task = Task::new(vec![new_file("a.mp3")], None).unwrap();
        let file = &mut task.files[0];
        assert!(file.apply(FilePatch::Failed("too soon".to_string())).is_err());
    }

    #[test]
    fn test_all_terminal() {
        let mut task = Task::new(vec![new_file("a.mp3"), new_file("b.mp3")], None).unwrap();
        assert!(!task.all_terminal());

        task.files[0].apply(FilePatch::Started).unwrap();
        task.files[0].apply(FilePatch::Completed(transcript())).unwrap();
        assert!(!task.all_terminal());

        task.files[1].apply(FilePatch::Started).unwrap();
        task.files[1].apply(FilePatch::Failed("boom".to_string())).unwrap();
        assert!(task.all_terminal());
    }
}
