use crate::domain::addressing::parse_segment_name;
use crate::domain::hls::render_master;
use crate::domain::ladder::ResolutionLadder;
use crate::domain::status::{RenditionStatus, VideoState};
use crate::domain::video::{Category, Video, VideoId};
use crate::ports::auth::Authenticator;
use crate::ports::catalog::{CatalogError, VideoCatalog};
use crate::ports::repository::{StatusTracker, TrackerError};
use crate::ports::storage::{ContentStore, SegmentFile, StoreError};
use crate::ports::BoxError;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Not authorized.")]
    Unauthorized,
    #[error("Not found.")]
    NotFound,
    #[error("Unsupported resolution {0:?}.")]
    UnsupportedResolution(String),
    #[error("{0} is still processing.")]
    NotReady(String),
    #[error("Requested range not satisfiable.")]
    RangeNotSatisfiable { len: u64 },
    #[error("Internal error: {0}")]
    Internal(#[source] BoxError),
}

impl From<TrackerError> for DeliveryError {
    fn from(err: TrackerError) -> Self {
        DeliveryError::Internal(err.into())
    }
}

impl From<CatalogError> for DeliveryError {
    fn from(err: CatalogError) -> Self {
        DeliveryError::Internal(err.into())
    }
}

impl From<StoreError> for DeliveryError {
    fn from(err: StoreError) -> Self {
        DeliveryError::Internal(err.into())
    }
}

/// One entry of the public video listing.
#[derive(Debug, Clone, Serialize)]
pub struct VideoSummary {
    pub id: VideoId,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub category: Category,
    pub state: VideoState,
    pub renditions: BTreeMap<String, &'static str>,
}

/// Per-rendition state including failure reasons, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub video_id: VideoId,
    pub state: VideoState,
    pub renditions: BTreeMap<String, RenditionStatus>,
}

/// Read path for clients. Readiness comes from the status tracker only;
/// the store is consulted after a rendition is known to be Ready.
pub struct DeliveryService {
    auth: Arc<dyn Authenticator>,
    catalog: Arc<dyn VideoCatalog>,
    tracker: Arc<dyn StatusTracker>,
    store: Arc<dyn ContentStore>,
    ladder: Arc<ResolutionLadder>,
}

impl DeliveryService {
    pub fn new(
        auth: Arc<dyn Authenticator>,
        catalog: Arc<dyn VideoCatalog>,
        tracker: Arc<dyn StatusTracker>,
        store: Arc<dyn ContentStore>,
        ladder: Arc<ResolutionLadder>,
    ) -> Self {
        Self {
            auth,
            catalog,
            tracker,
            store,
            ladder,
        }
    }

    /// Runs before any other operation. The answer never depends on what
    /// the request addresses.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<(), DeliveryError> {
        if self.auth.is_authenticated(headers).await {
            Ok(())
        } else {
            Err(DeliveryError::Unauthorized)
        }
    }

    pub async fn list_videos(&self) -> Result<Vec<VideoSummary>, DeliveryError> {
        let videos = self.catalog.list().await?;
        let mut summaries = Vec::with_capacity(videos.len());
        for video in videos {
            let status = self.tracker.get(&video.id).await?;
            summaries.push(summarize(video, status.as_ref().map(|s| &s.renditions)));
        }
        Ok(summaries)
    }

    pub async fn get_manifest(
        &self,
        video_id: &str,
        resolution: &str,
    ) -> Result<Vec<u8>, DeliveryError> {
        let video_id = self.ready_rendition(video_id, resolution).await?;
        match self.store.read_manifest(&video_id, resolution).await? {
            Some(manifest) => Ok(manifest),
            None => {
                tracing::error!(video_id = %video_id, resolution, "ready rendition has no manifest");
                Err(DeliveryError::NotFound)
            }
        }
    }

    pub async fn get_segment(
        &self,
        video_id: &str,
        resolution: &str,
        segment: &str,
    ) -> Result<SegmentFile, DeliveryError> {
        let index = parse_segment_name(segment).ok_or(DeliveryError::NotFound)?;
        let video_id = self.ready_rendition(video_id, resolution).await?;
        self.store
            .open_segment(&video_id, resolution, index)
            .await?
            .ok_or(DeliveryError::NotFound)
    }

    /// Master playlist over the renditions that are Ready, in ladder order.
    pub async fn get_master(&self, video_id: &str) -> Result<String, DeliveryError> {
        let video_id = self.known_video(video_id).await?;
        let status = self.tracker.get(&video_id).await?;
        let ready: Vec<_> = self
            .ladder
            .entries()
            .iter()
            .filter(|entry| {
                status
                    .as_ref()
                    .and_then(|s| s.rendition(&entry.name))
                    .is_some_and(RenditionStatus::is_ready)
            })
            .collect();
        if ready.is_empty() {
            tracing::debug!(video_id = %video_id, "no rendition ready for master playlist");
            return Err(DeliveryError::NotReady(format!("video {}", video_id)));
        }
        Ok(render_master(ready))
    }

    pub async fn status_report(&self, video_id: &str) -> Result<StatusReport, DeliveryError> {
        let video_id = self.known_video(video_id).await?;
        let renditions = self
            .tracker
            .get(&video_id)
            .await?
            .map(|s| s.renditions)
            .unwrap_or_default();
        Ok(StatusReport {
            state: VideoState::aggregate(renditions.values()),
            video_id,
            renditions,
        })
    }

    async fn known_video(&self, raw: &str) -> Result<VideoId, DeliveryError> {
        let video_id = VideoId::parse(raw).map_err(|_| DeliveryError::NotFound)?;
        match self.catalog.get_video_record(&video_id).await? {
            Some(_) => Ok(video_id),
            None => Err(DeliveryError::NotFound),
        }
    }

    async fn ready_rendition(&self, raw: &str, resolution: &str) -> Result<VideoId, DeliveryError> {
        let video_id = self.known_video(raw).await?;
        if !self.ladder.contains(resolution) {
            return Err(DeliveryError::UnsupportedResolution(resolution.to_string()));
        }
        match self.tracker.get_rendition(&video_id, resolution).await? {
            Some(RenditionStatus::Ready) => Ok(video_id),
            other => {
                tracing::debug!(
                    video_id = %video_id,
                    resolution,
                    state = other.as_ref().map_or("untracked", RenditionStatus::label),
                    "rendition not ready"
                );
                Err(DeliveryError::NotReady(format!("{}/{}", video_id, resolution)))
            }
        }
    }
}

fn summarize(video: Video, renditions: Option<&BTreeMap<String, RenditionStatus>>) -> VideoSummary {
    let thumbnail_url = video
        .thumbnail_path
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|name| format!("/thumbnails/{}", name.to_string_lossy()));
    let (state, renditions) = match renditions {
        Some(r) => (
            VideoState::aggregate(r.values()),
            r.iter().map(|(name, s)| (name.clone(), s.label())).collect(),
        ),
        None => (VideoState::Processing, BTreeMap::new()),
    };
    VideoSummary {
        id: video.id,
        created_at: video.created_at,
        title: video.title,
        description: video.description,
        thumbnail_url,
        category: video.category,
        state,
        renditions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{Harness, Step, VIEWER_TOKEN};
    use axum::http::{header::AUTHORIZATION, HeaderValue};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_manifest_and_segments_after_encode() {
        let h = Harness::new();
        let (video, _) = h.ingest.create_video(h.new_video("movie.mp4")).await.unwrap();
        h.drain().await;

        let manifest = h.delivery.get_manifest(video.id.as_str(), "720p").await.unwrap();
        let text = String::from_utf8(manifest).unwrap();
        assert!(text.starts_with("#EXTM3U\n"));
        assert!(text.contains("#EXTINF:4.500000,\nsegment_002.ts\n"));

        let mut segment = h
            .delivery
            .get_segment(video.id.as_str(), "720p", "segment_001.ts")
            .await
            .unwrap();
        let mut body = String::new();
        segment.file.read_to_string(&mut body).await.unwrap();
        assert_eq!(segment.len, body.len() as u64);
        assert!(body.starts_with("720p:1"));
    }

    #[tokio::test]
    async fn test_not_ready_while_encoding() {
        let h = Harness::new();
        let (video, _) = h.ingest.create_video(h.new_video("movie.mp4")).await.unwrap();
        h.tracker
            .set_rendition(&video.id, "720p", RenditionStatus::Encoding)
            .await
            .unwrap();

        let err = h
            .delivery
            .get_segment(video.id.as_str(), "720p", "segment_002.ts")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::NotReady(_)));
        let err = h.delivery.get_manifest(video.id.as_str(), "720p").await.unwrap_err();
        assert!(matches!(err, DeliveryError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_unknown_video_resolution_and_segment() {
        let h = Harness::new();
        let (video, _) = h.ingest.create_video(h.new_video("movie.mp4")).await.unwrap();
        h.drain().await;

        let err = h.delivery.get_manifest("999", "480p").await.unwrap_err();
        assert!(matches!(err, DeliveryError::NotFound));
        let err = h.delivery.get_manifest("../etc", "480p").await.unwrap_err();
        assert!(matches!(err, DeliveryError::NotFound));
        let err = h.delivery.get_manifest(video.id.as_str(), "4k").await.unwrap_err();
        assert!(matches!(err, DeliveryError::UnsupportedResolution(_)));

        for name in ["segment_9.ts", "segment_0001.ts", "index.m3u8", "segment_007.ts"] {
            let err = h
                .delivery
                .get_segment(video.id.as_str(), "480p", name)
                .await
                .unwrap_err();
            assert!(matches!(err, DeliveryError::NotFound), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_failed_rendition_does_not_hide_others() {
        let h = Harness::new();
        for _ in 0..3 {
            h.encoder.push("1080p", Step::Fail(1));
        }
        let (video, _) = h.ingest.create_video(h.new_video("movie.mp4")).await.unwrap();
        h.drain().await;

        assert!(h.delivery.get_manifest(video.id.as_str(), "480p").await.is_ok());
        let err = h.delivery.get_manifest(video.id.as_str(), "1080p").await.unwrap_err();
        assert!(matches!(err, DeliveryError::NotReady(_)));

        let master = h.delivery.get_master(video.id.as_str()).await.unwrap();
        assert!(master.contains("480p/index.m3u8"));
        assert!(master.contains("720p/index.m3u8"));
        assert!(!master.contains("1080p"));

        let report = h.delivery.status_report(video.id.as_str()).await.unwrap();
        assert_eq!(report.state, VideoState::Failed);
        assert!(matches!(
            report.renditions.get("1080p"),
            Some(RenditionStatus::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn test_master_not_ready_before_any_rendition() {
        let h = Harness::new();
        let (video, _) = h.ingest.create_video(h.new_video("movie.mp4")).await.unwrap();
        let err = h.delivery.get_master(video.id.as_str()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::NotReady(_)));
    }

    #[tokio::test]
    async fn test_listing_newest_first_with_state() {
        let h = Harness::new();
        let (first, _) = h.ingest.create_video(h.new_video("a.mp4")).await.unwrap();
        h.drain().await;
        let (second, _) = h.ingest.create_video(h.new_video("b.mov")).await.unwrap();

        let listing = h.delivery.list_videos().await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].id, second.id);
        assert_eq!(listing[0].state, VideoState::Processing);
        assert_eq!(listing[1].id, first.id);
        assert_eq!(listing[1].state, VideoState::Ready);
        assert_eq!(listing[1].renditions.get("480p"), Some(&"ready"));
    }

    #[tokio::test]
    async fn test_authorize() {
        let h = Harness::new();
        let mut headers = HeaderMap::new();
        assert!(matches!(
            h.delivery.authorize(&headers).await,
            Err(DeliveryError::Unauthorized)
        ));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", VIEWER_TOKEN)).unwrap(),
        );
        assert!(h.delivery.authorize(&headers).await.is_ok());
    }
}
