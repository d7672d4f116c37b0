//! Transcription engine boundary
//!
//! The worker talks to transcription through this trait so tests can
//! script outcomes without spawning processes.

pub mod whisper_cli;

pub use whisper_cli::WhisperCli;

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::model::WhisperModel;
use crate::tasks::Transcript;

/// Callback fed whole-percent progress while a file is transcribed
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Trait for turning one media file into a transcript
///
/// Implementations:
/// - `WhisperCli`: shells out to a whisper.cpp binary
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe a single media file with the given model.
    ///
    /// `on_progress` gets called with 0-100 percentages as the engine
    /// reports them; callers must tolerate it never firing.
    async fn transcribe(
        &self,
        media_path: &Path,
        model: WhisperModel,
        on_progress: ProgressFn<'_>,
    ) -> Result<Transcript>;

    /// Engine name for logging
    fn name(&self) -> &str;
}
