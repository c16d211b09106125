//! Operator routes: register, delete, retry and inspect videos.

use super::error::ApiError;
use super::upload::{path_is_valid, stream_to_file};
use super::AppState;
use crate::application::delivery::{DeliveryError, StatusReport};
use crate::domain::jobs::JobId;
use crate::domain::video::{
    source_file_name, validate_source_extension, Category, NewVideo, Video, VideoError, VideoId,
};
use crate::ports::queue::Enqueued;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::path::{Path as FsPath, PathBuf};

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    /// True when an already active job absorbed the request.
    pub coalesced: bool,
}

impl From<Enqueued> for JobAccepted {
    fn from(enqueued: Enqueued) -> Self {
        match enqueued {
            Enqueued::Accepted(job_id) => Self {
                job_id,
                coalesced: false,
            },
            Enqueued::Coalesced(job_id) => Self {
                job_id,
                coalesced: true,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VideoCreated {
    pub video: Video,
    pub job: JobAccepted,
}

#[derive(Default)]
struct UploadForm {
    title: Option<String>,
    description: String,
    category: Category,
    source_path: Option<PathBuf>,
    thumbnail_path: Option<PathBuf>,
}

impl UploadForm {
    async fn discard_files(&self) {
        for path in [&self.source_path, &self.thumbnail_path].into_iter().flatten() {
            let _ = tokio::fs::remove_file(path).await;
        }
    }
}

async fn save_field(
    dir: &FsPath,
    original: &str,
    field: axum::extract::multipart::Field<'_>,
) -> Result<PathBuf, ApiError> {
    let name = source_file_name(original);
    if !path_is_valid(FsPath::new(&name)) {
        return Err(ApiError::bad_request("Invalid file name."));
    }
    tokio::fs::create_dir_all(dir).await.map_err(ApiError::internal)?;
    let path = dir.join(name);
    let written = stream_to_file(&path, field).await.map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "upload interrupted");
        ApiError::bad_request("Upload interrupted.")
    })?;
    tracing::info!(path = %path.display(), bytes = written, "upload saved");
    Ok(path)
}

async fn read_form(
    state: &AppState,
    multipart: &mut Multipart,
    form: &mut UploadForm,
) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "title" => form.title = Some(field.text().await?),
            "description" => form.description = field.text().await?,
            "category" => {
                let raw = field.text().await?;
                form.category = raw
                    .parse()
                    .map_err(|e: VideoError| ApiError::bad_request(e.to_string()))?;
            }
            "file" => {
                let original = field.file_name().unwrap_or_default().to_owned();
                validate_source_extension(FsPath::new(&original))
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                form.source_path = Some(save_field(&state.sources_dir, &original, field).await?);
            }
            "thumbnail" => {
                let original = field.file_name().unwrap_or("thumbnail.jpg").to_owned();
                let saved = save_field(&state.thumbnails_dir, &original, field).await?;
                form.thumbnail_path = Some(saved);
            }
            _ => continue,
        }
    }
    Ok(())
}

/// `POST /admin/video`: multipart with `title`, `description`, `category`,
/// `file` and an optional `thumbnail`.
pub async fn create(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<VideoCreated>), ApiError> {
    let mut form = UploadForm::default();
    if let Err(e) = read_form(&state, &mut multipart, &mut form).await {
        form.discard_files().await;
        return Err(e);
    }

    let (title, source_path) = match (form.title.clone(), form.source_path.clone()) {
        (Some(title), Some(source_path)) if !title.trim().is_empty() => (title, source_path),
        _ => {
            form.discard_files().await;
            return Err(ApiError::bad_request("A title and a source file are required."));
        }
    };

    let new_video = NewVideo {
        title,
        description: form.description.clone(),
        category: form.category,
        source_path,
        thumbnail_path: form.thumbnail_path.clone(),
    };
    match state.ingest.create_video(new_video).await {
        Ok((video, enqueued)) => Ok((
            StatusCode::CREATED,
            Json(VideoCreated {
                video,
                job: enqueued.into(),
            }),
        )),
        Err(e) => {
            form.discard_files().await;
            Err(e.into())
        }
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let video_id = VideoId::parse(&video_id).map_err(|_| ApiError::not_found())?;
    match state.cleanup.delete_video(&video_id).await? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError::not_found()),
    }
}

pub async fn retry(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let video_id = VideoId::parse(&video_id).map_err(|_| ApiError::not_found())?;
    let enqueued = state.ingest.retry(&video_id).await?;
    Ok((StatusCode::ACCEPTED, Json(enqueued.into())))
}

pub async fn status(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<StatusReport>, DeliveryError> {
    Ok(Json(state.delivery.status_report(&video_id).await?))
}
