//! whisper.cpp adapter
//!
//! Spawns the `whisper-cli` binary per file, reads progress off its
//! stderr and collects the transcript from its JSON output file.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{ProgressFn, TranscriptionEngine};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::WhisperModel;
use crate::tasks::Transcript;

/// Transcription by shelling out to whisper.cpp
pub struct WhisperCli {
    binary: PathBuf,
    model_dir: PathBuf,
    language: Option<String>,
    threads: usize,
    progress_re: Regex,
}

impl WhisperCli {
    pub fn new(config: &EngineConfig) -> Self {
        let threads = config
            .threads
            .unwrap_or_else(|| num_cpus::get().min(8));

        Self {
            binary: config.binary.clone(),
            model_dir: config.model_dir.clone(),
            language: config.language.clone(),
            threads,
            // whisper.cpp prints "whisper_print_progress_callback: progress =  42%"
            progress_re: Regex::new(r"progress\s*=\s*(\d+)%").expect("Invalid regex"),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Where the weights for a model are expected on disk
    pub fn model_path(&self, model: WhisperModel) -> PathBuf {
        self.model_dir.join(model.ggml_filename())
    }

    /// True when the binary can be launched at all
    pub fn binary_available(&self) -> bool {
        std::process::Command::new(&self.binary)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    /// Models whose weight files are present in the model directory
    pub fn available_models(&self) -> Vec<WhisperModel> {
        WhisperModel::ALL
            .into_iter()
            .filter(|m| self.model_path(*m).exists())
            .collect()
    }

    fn parse_progress(&self, line: &str) -> Option<u8> {
        let caps = self.progress_re.captures(line)?;
        let pct: u64 = caps.get(1)?.as_str().parse().ok()?;
        Some(pct.min(100) as u8)
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperCli {
    async fn transcribe(
        &self,
        media_path: &Path,
        model: WhisperModel,
        on_progress: ProgressFn<'_>,
    ) -> Result<Transcript> {
        let model_path = self.model_path(model);
        if !model_path.exists() {
            return Err(Error::engine(format!(
                "Model file {} is missing; download it into {}",
                model.ggml_filename(),
                self.model_dir.display()
            )));
        }
        if !media_path.exists() {
            return Err(Error::engine(format!(
                "Media file {} does not exist",
                media_path.display()
            )));
        }

        // whisper.cpp writes <prefix>.json when given -oj / -of
        let output_base = media_path.with_extension("out");
        let json_path = output_base.with_extension("json");

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-m")
            .arg(&model_path)
            .arg("-f")
            .arg(media_path)
            .arg("-oj")
            .arg("-of")
            .arg(&output_base)
            .arg("-pp")
            .arg("-np")
            .arg("-t")
            .arg(self.threads.to_string());
        if let Some(lang) = &self.language {
            cmd.arg("-l").arg(lang);
        }
        cmd.stdout(Stdio::null()).stderr(Stdio::piped());

        tracing::debug!(
            "Running {} on {} (model {}, {} threads)",
            self.binary.display(),
            media_path.display(),
            model,
            self.threads
        );

        let mut child = cmd.spawn().map_err(|e| {
            Error::engine(format!("Failed to launch {}: {}", self.binary.display(), e))
        })?;

        let stderr = child.stderr.take().ok_or_else(|| {
            Error::engine("Could not capture transcriber output".to_string())
        })?;

        // Progress arrives as stderr lines; keep a tail for error reports
        let mut tail: Vec<String> = Vec::new();
        let mut lines = BufReader::new(stderr).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| Error::engine(format!("Lost transcriber output: {}", e)))?
        {
            if let Some(pct) = self.parse_progress(&line) {
                on_progress(pct);
                continue;
            }
            if tail.len() >= 20 {
                tail.remove(0);
            }
            tail.push(line);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::engine(format!("Transcriber did not exit cleanly: {}", e)))?;

        if !status.success() {
            let _ = tokio::fs::remove_file(&json_path).await;
            return Err(Error::engine(format!(
                "Transcription failed ({}): {}",
                status,
                tail.join(" | ")
            )));
        }

        let raw = tokio::fs::read_to_string(&json_path).await.map_err(|e| {
            Error::engine(format!(
                "Transcriber produced no output file {}: {}",
                json_path.display(),
                e
            ))
        })?;
        let _ = tokio::fs::remove_file(&json_path).await;

        parse_output(&raw, self.language.as_deref())
    }

    fn name(&self) -> &str {
        "whisper-cli"
    }
}

// ==================== Output Parsing ====================

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    result: Option<WhisperResult>,
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperResult {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    offsets: WhisperOffsets,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhisperOffsets {
    #[allow(dead_code)]
    from: i64,
    /// Segment end in milliseconds
    to: i64,
}

/// Shape whisper.cpp JSON output into a [`Transcript`]
fn parse_output(raw: &str, language_hint: Option<&str>) -> Result<Transcript> {
    let output: WhisperOutput = serde_json::from_str(raw)
        .map_err(|e| Error::engine(format!("Unreadable transcriber output: {}", e)))?;

    let text: String = output
        .transcription
        .iter()
        .map(|s| s.text.as_str())
        .collect::<String>()
        .trim()
        .to_string();

    let duration = output
        .transcription
        .iter()
        .map(|s| s.offsets.to)
        .max()
        .map(|ms| ms as f64 / 1000.0)
        .unwrap_or(0.0);

    let language = output
        .result
        .and_then(|r| r.language)
        .or_else(|| language_hint.map(String::from))
        .unwrap_or_else(|| "en".to_string());

    Ok(Transcript {
        text,
        language,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine() -> WhisperCli {
        WhisperCli::new(&EngineConfig {
            binary: PathBuf::from("whisper-cli"),
            model_dir: PathBuf::from("/opt/models"),
            language: None,
            threads: Some(4),
        })
    }

    #[test]
    fn test_progress_line_parsing() {
        let engine = test_engine();
        assert_eq!(
            engine.parse_progress("whisper_print_progress_callback: progress =   5%"),
            Some(5)
        );
        assert_eq!(engine.parse_progress("progress = 100%"), Some(100));
        // Values past 100 are clamped, not rejected
        assert_eq!(engine.parse_progress("progress = 150%"), Some(100));
        assert_eq!(engine.parse_progress("loading model..."), None);
        assert_eq!(engine.parse_progress(""), None);
    }

    #[test]
    fn test_model_path_uses_ggml_names() {
        let engine = test_engine();
        assert_eq!(
            engine.model_path(WhisperModel::Turbo),
            PathBuf::from("/opt/models/ggml-large-v3-turbo.bin")
        );
    }

    #[test]
    fn test_parse_output_joins_segments() {
        let raw = r#"{
            "result": {"language": "de"},
            "transcription": [
                {"offsets": {"from": 0, "to": 2000}, "text": " Guten"},
                {"offsets": {"from": 2000, "to": 4500}, "text": " Tag"}
            ]
        }"#;

        let transcript = parse_output(raw, None).unwrap();
        assert_eq!(transcript.text, "Guten Tag");
        assert_eq!(transcript.language, "de");
        assert!((transcript.duration - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_output_empty_transcription() {
        let raw = r#"{"result": {"language": "en"}, "transcription": []}"#;
        let transcript = parse_output(raw, None).unwrap();
        assert_eq!(transcript.text, "");
        assert_eq!(transcript.duration, 0.0);
    }

    #[test]
    fn test_parse_output_language_fallbacks() {
        let raw = r#"{"transcription": [{"offsets": {"from": 0, "to": 100}, "text": "hi"}]}"#;
        assert_eq!(parse_output(raw, Some("nl")).unwrap().language, "nl");
        assert_eq!(parse_output(raw, None).unwrap().language, "en");
    }

    #[test]
    fn test_parse_output_rejects_garbage() {
        assert!(matches!(
            parse_output("not json at all", None),
            Err(Error::Engine(_))
        ));
    }
}
