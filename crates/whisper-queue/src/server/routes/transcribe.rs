//! Task submission endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::tasks::NewTaskFile;

const ALLOWED_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "m4a", "mp4", "aac", "ogg", "webm", "ts", "mov",
];

const ALLOWED_MIME_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/wav",
    "audio/x-wav",
    "audio/wave",
    "audio/mp4",
    "audio/m4a",
    "audio/x-m4a",
    "audio/aac",
    "audio/ogg",
    "audio/webm",
    "video/webm",
    "video/mp4",
    "video/quicktime",
    "video/mp2t",
    "audio/ts",
];

/// Substrings that must never appear in an uploaded filename
const FORBIDDEN_FRAGMENTS: &[&str] = &["..", "/", "\\", "<", ">", ":", "\"", "|", "?", "*"];

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub task_id: Uuid,
    pub status: String,
    pub message: String,
    pub file_count: usize,
    pub files: Vec<String>,
}

/// POST /transcribe - Submit a batch of media files
pub async fn submit_task(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TranscribeResponse>> {
    let upload_config = state.config().upload.clone();
    let (files, user_id) = collect_parts(&upload_config, multipart).await?;

    let spool_paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
    let filenames: Vec<String> = files.iter().map(|f| f.filename.clone()).collect();

    let task = match state.store().create(files, user_id) {
        Ok(task) => task,
        Err(e) => {
            discard_paths(&spool_paths).await;
            return Err(e);
        }
    };

    match state.queue().enqueue(task.task_id) {
        Ok(position) => Ok(Json(TranscribeResponse {
            task_id: task.task_id,
            status: "queued".to_string(),
            message: format!(
                "{} file(s) queued for transcription at position {}",
                filenames.len(),
                position
            ),
            file_count: filenames.len(),
            files: filenames,
        })),
        Err(e) => {
            // The queue would never pick this task up; undo the submission
            state.store().remove(task.task_id);
            discard_paths(&spool_paths).await;
            Err(e)
        }
    }
}

/// Read every multipart part, spooling accepted files to disk.
///
/// Any rejected part voids the whole batch; files spooled before the
/// rejection are deleted again.
async fn collect_parts(
    config: &UploadConfig,
    mut multipart: Multipart,
) -> Result<(Vec<NewTaskFile>, Option<String>)> {
    let mut staged: Vec<NewTaskFile> = Vec::new();
    let mut user_id: Option<String> = None;

    if let Err(e) = read_parts(config, &mut multipart, &mut staged, &mut user_id).await {
        discard_files(&staged).await;
        return Err(e);
    }

    if staged.is_empty() {
        return Err(Error::validation("At least one media file is required"));
    }

    Ok((staged, user_id))
}

async fn read_parts(
    config: &UploadConfig,
    multipart: &mut Multipart,
    staged: &mut Vec<NewTaskFile>,
    user_id: &mut Option<String>,
) -> Result<()> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("Malformed multipart request: {}", e)))?
    {
        let filename = match field.file_name() {
            Some(name) => name.to_string(),
            None => {
                // Text fields: only user_id is meaningful
                if field.name() == Some("user_id") {
                    let text = field.text().await.map_err(|e| {
                        Error::validation(format!("Unreadable user_id field: {}", e))
                    })?;
                    let text = text.trim();
                    if !text.is_empty() {
                        *user_id = Some(text.to_string());
                    }
                }
                continue;
            }
        };

        if staged.len() >= config.max_files_per_batch {
            return Err(Error::validation(format!(
                "A task can hold at most {} files",
                config.max_files_per_batch
            )));
        }

        let declared = field.content_type().map(|m| m.to_string());
        let data = field.bytes().await.map_err(|e| {
            Error::validation(format!("Failed to read upload '{}': {}", filename, e))
        })?;

        let content_type =
            validate_upload(&filename, declared.as_deref(), &data, config.max_file_size)?;

        let path = spool(&config.spool_dir, &filename, &data).await?;
        tracing::info!("Accepted '{}' ({} bytes, {})", filename, data.len(), content_type);

        staged.push(NewTaskFile {
            filename,
            size: data.len() as u64,
            content_type,
            path,
        });
    }

    Ok(())
}

/// Check one upload against the acceptance rules; returns the effective
/// content type when the file passes.
fn validate_upload(
    filename: &str,
    declared_mime: Option<&str>,
    data: &[u8],
    max_size: u64,
) -> Result<String> {
    if filename.trim().is_empty() {
        return Err(Error::validation("Filename must not be empty"));
    }

    for fragment in FORBIDDEN_FRAGMENTS {
        if filename.contains(fragment) {
            return Err(Error::validation(format!(
                "Filename '{}' contains forbidden characters",
                filename
            )));
        }
    }

    let ext = extension_of(filename).ok_or_else(|| {
        Error::validation(format!("File '{}' has no extension", filename))
    })?;
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(Error::validation(format!(
            "File type '.{}' is not supported. Supported types: {}",
            ext,
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    // curl and friends default to octet-stream; trust the extension then
    let mime = match declared_mime {
        Some(m) if m != "application/octet-stream" => m.to_string(),
        _ => mime_guess::from_path(filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    };
    let mime_allowed = ALLOWED_MIME_TYPES.contains(&mime.as_str())
        || (mime == "text/plain" && ext == "ts");
    if !mime_allowed {
        return Err(Error::validation(format!(
            "Content type '{}' is not allowed for '{}'",
            mime, filename
        )));
    }

    if data.is_empty() {
        return Err(Error::validation(format!("File '{}' is empty", filename)));
    }
    if data.len() as u64 > max_size {
        return Err(Error::validation(format!(
            "File '{}' exceeds the {} MB size limit",
            filename,
            max_size / (1024 * 1024)
        )));
    }
    if looks_executable(data) {
        return Err(Error::validation(format!(
            "File '{}' looks like an executable, not media",
            filename
        )));
    }

    Ok(mime)
}

fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Sniff PE, ELF and Mach-O magic numbers
fn looks_executable(data: &[u8]) -> bool {
    if data.starts_with(&[0x4D, 0x5A]) {
        return true;
    }
    if data.len() < 4 {
        return false;
    }
    matches!(
        &data[..4],
        [0x7F, b'E', b'L', b'F']
            | [0xFE, 0xED, 0xFA, 0xCE]
            | [0xFE, 0xED, 0xFA, 0xCF]
            | [0xCE, 0xFA, 0xED, 0xFE]
            | [0xCF, 0xFA, 0xED, 0xFE]
    )
}

async fn spool(dir: &Path, filename: &str, data: &[u8]) -> Result<PathBuf> {
    let path = dir.join(format!("{}-{}", Uuid::new_v4(), filename));
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| Error::internal(format!("Failed to spool '{}': {}", filename, e)))?;
    Ok(path)
}

async fn discard_files(files: &[NewTaskFile]) {
    for file in files {
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            tracing::debug!("Spool cleanup for '{}': {}", file.filename, e);
        }
    }
}

async fn discard_paths(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::debug!("Spool cleanup for {}: {}", path.display(), e);
        }
    }
}
