//! Streaming routes. Authorization has already run when these execute.

use super::range::{parse_range, RangeRequest};
use super::AppState;
use crate::application::delivery::{DeliveryError, VideoSummary};
use crate::domain::addressing::MANIFEST_NAME;
use crate::ports::storage::SegmentFile;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<VideoSummary>>, DeliveryError> {
    Ok(Json(state.delivery.list_videos().await?))
}

pub async fn master(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Response, DeliveryError> {
    let playlist = state.delivery.get_master(&video_id).await?;
    Ok(playlist_response(playlist.into_bytes()))
}

pub async fn artifact(
    State(state): State<AppState>,
    Path((video_id, resolution, file)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, DeliveryError> {
    if file == MANIFEST_NAME {
        let manifest = state.delivery.get_manifest(&video_id, &resolution).await?;
        return Ok(playlist_response(manifest));
    }

    let segment = state
        .delivery
        .get_segment(&video_id, &resolution, &file)
        .await?;
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    segment_response(segment, range).await
}

fn playlist_response(body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

async fn segment_response(
    segment: SegmentFile,
    range: Option<&str>,
) -> Result<Response, DeliveryError> {
    let SegmentFile { mut file, len } = segment;

    match parse_range(range, len) {
        RangeRequest::Full => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE.to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (header::CONTENT_LENGTH, len.to_string()),
            ],
            Body::from_stream(ReaderStream::new(file)),
        )
            .into_response()),
        RangeRequest::Partial(byte_range) => {
            file.seek(SeekFrom::Start(byte_range.start))
                .await
                .map_err(|e| DeliveryError::Internal(e.into()))?;
            let body = Body::from_stream(ReaderStream::new(file.take(byte_range.len())));
            Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (header::CONTENT_LENGTH, byte_range.len().to_string()),
                    (header::CONTENT_RANGE, byte_range.content_range(len)),
                ],
                body,
            )
                .into_response())
        }
        RangeRequest::Unsatisfiable => Err(DeliveryError::RangeNotSatisfiable { len }),
    }
}
