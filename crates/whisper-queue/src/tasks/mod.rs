//! Task records, the in-memory store, and read-side views

pub mod record;
pub mod results;
pub mod store;
pub mod summary;

pub use record::{
    FilePatch, FileStatus, NewTaskFile, Task, TaskFile, Transcript, MAX_FILES_PER_TASK,
};
pub use results::{all_results, completed_results, file_result};
pub use results::{CompletedFileResult, FileResultView, TaskResults};
pub use store::{ClearStats, TaskStore};
pub use summary::{summarize, OverallStatus, TaskSummary};
