use crate::AppState;
use crate::api::error::ApiError;
use crate::sampler;
use axum::extract::multipart::Field;
use axum::extract::rejection::{JsonRejection, MultipartRejection, QueryRejection};
use axum::extract::{Extension, Multipart, Query};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt as _;
use tracing::{error, info};

/// Multipart field carrying the uploaded video.
pub const VIDEO_FIELD: &str = "video";

#[derive(Serialize, Deserialize)]
pub struct Message {
    pub text: String,
}

#[derive(Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct FramesResponse {
    pub frames: Vec<String>,
}

#[derive(Deserialize)]
pub struct ExtractParams {
    /// ?count=8
    pub count: Option<usize>,
}

pub async fn create_message(
    payload: Result<Json<Message>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Json(msg) = payload?;
    Ok(Json(MessageResponse { message: msg.text }))
}

#[axum::debug_handler]
pub async fn extract_frames(
    Extension(state): Extension<AppState>,
    params: Result<Query<ExtractParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<FramesResponse>, ApiError> {
    let Query(params) = params?;
    let mut multipart = multipart?;
    let count = params.count.unwrap_or(state.frames);
    let video_path = save_video(state.uploads_dir(), &mut multipart).await?;

    let out_dir = state.temp_dir.clone();
    let path = video_path.clone();
    let frames = tokio::task::spawn_blocking(move || {
        sampler::extract_random_frames(&path, &out_dir, count)
    })
    .await
    .map_err(|error| ApiError::Internal(error.to_string()))??;

    info!(
        video = %video_path.display(),
        requested = count,
        written = frames.len(),
        "Frames extracted"
    );

    Ok(Json(FramesResponse {
        frames: frames
            .iter()
            .map(|path| path.display().to_string())
            .collect(),
    }))
}

/// Streams the first `video` field into `uploads_dir`, keeping the client's file name.
async fn save_video(uploads_dir: &Path, multipart: &mut Multipart) -> Result<PathBuf, ApiError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let Some(file_name) = field.file_name().and_then(upload_file_name) else {
            return Err(ApiError::MissingVideo);
        };

        info!(%file_name, "Uploading video");
        let upload_path = uploads_dir.join(&file_name);
        if let Err(error) = write_field(&mut field, &upload_path).await {
            error!(%file_name, %error, "Failed to write upload file");
            // clean up partial upload
            let _ = tokio::fs::remove_file(&upload_path).await;
            return Err(error);
        }

        return Ok(upload_path);
    }

    Err(ApiError::MissingVideo)
}

async fn write_field(field: &mut Field<'_>, path: &Path) -> Result<(), ApiError> {
    let mut file = tokio::fs::File::create(path).await?;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Final path component of a client supplied file name, splitting on both
/// `/` and `\` so Windows style names reduce the same way.
fn upload_file_name(name: &str) -> Option<String> {
    name.rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_owned)
}
