use super::BoxError;
use crate::domain::status::{RenditionStatus, VideoState, VideoStatus};
use crate::domain::video::VideoId;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("video {0} is not tracked")]
    UnknownVideo(VideoId),
    #[error("rendition {resolution} of video {video_id} is not tracked")]
    UnknownRendition {
        video_id: VideoId,
        resolution: String,
    },
    #[error("illegal transition of {video_id}/{resolution}: {from} -> {to}")]
    IllegalTransition {
        video_id: VideoId,
        resolution: String,
        from: RenditionStatus,
        to: RenditionStatus,
    },
    #[error("tracker backend error: {0}")]
    Backend(#[source] BoxError),
}

impl TrackerError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        TrackerError::Backend(err.into())
    }
}

/// Apply one registration step to an existing status: new renditions start
/// Pending, Failed ones go back to Pending, everything else is kept.
pub fn register_rendition(existing: Option<&RenditionStatus>) -> RenditionStatus {
    match existing {
        None | Some(RenditionStatus::Failed { .. }) => RenditionStatus::Pending,
        Some(other) => other.clone(),
    }
}

/// Single source of truth for rendition state.
///
/// Only the worker owning a rendition's encode writes it; readers never block
/// on an encode in progress.
#[async_trait]
pub trait StatusTracker: Send + Sync {
    /// Begin (or resume) tracking `renditions` for a video, see
    /// [`register_rendition`]. Returns the resulting snapshot.
    async fn register(
        &self,
        video_id: &VideoId,
        renditions: &[String],
    ) -> Result<VideoStatus, TrackerError>;

    async fn get(&self, video_id: &VideoId) -> Result<Option<VideoStatus>, TrackerError>;

    async fn get_rendition(
        &self,
        video_id: &VideoId,
        resolution: &str,
    ) -> Result<Option<RenditionStatus>, TrackerError>;

    /// Fails with `UnknownVideo` once the video was removed, and with
    /// `IllegalTransition` if the move would leave Ready.
    async fn set_rendition(
        &self,
        video_id: &VideoId,
        resolution: &str,
        status: RenditionStatus,
    ) -> Result<(), TrackerError>;

    /// Forget a video. Returns whether it was tracked.
    async fn remove(&self, video_id: &VideoId) -> Result<bool, TrackerError>;

    async fn state(&self, video_id: &VideoId) -> Result<Option<VideoState>, TrackerError> {
        Ok(self.get(video_id).await?.map(|status| status.state()))
    }
}
