use crate::domain::status::{RenditionStatus, VideoStatus};
use crate::domain::video::VideoId;
use crate::ports::repository::{register_rendition, StatusTracker, TrackerError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryStatusTracker {
    videos: RwLock<HashMap<VideoId, VideoStatus>>,
}

impl InMemoryStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusTracker for InMemoryStatusTracker {
    async fn register(
        &self,
        video_id: &VideoId,
        renditions: &[String],
    ) -> Result<VideoStatus, TrackerError> {
        let mut videos = self.videos.write().await;
        let status = videos.entry(video_id.clone()).or_insert_with(|| VideoStatus {
            renditions: Default::default(),
        });
        for name in renditions {
            let next = register_rendition(status.renditions.get(name));
            status.renditions.insert(name.clone(), next);
        }
        Ok(status.clone())
    }

    async fn get(&self, video_id: &VideoId) -> Result<Option<VideoStatus>, TrackerError> {
        Ok(self.videos.read().await.get(video_id).cloned())
    }

    async fn get_rendition(
        &self,
        video_id: &VideoId,
        resolution: &str,
    ) -> Result<Option<RenditionStatus>, TrackerError> {
        let videos = self.videos.read().await;
        Ok(videos
            .get(video_id)
            .and_then(|s| s.rendition(resolution))
            .cloned())
    }

    async fn set_rendition(
        &self,
        video_id: &VideoId,
        resolution: &str,
        status: RenditionStatus,
    ) -> Result<(), TrackerError> {
        let mut videos = self.videos.write().await;
        let video = videos
            .get_mut(video_id)
            .ok_or_else(|| TrackerError::UnknownVideo(video_id.clone()))?;
        let current = video.renditions.get_mut(resolution).ok_or_else(|| {
            TrackerError::UnknownRendition {
                video_id: video_id.clone(),
                resolution: resolution.to_string(),
            }
        })?;
        if *current != status && !current.can_transition_to(&status) {
            return Err(TrackerError::IllegalTransition {
                video_id: video_id.clone(),
                resolution: resolution.to_string(),
                from: current.clone(),
                to: status,
            });
        }
        *current = status;
        Ok(())
    }

    async fn remove(&self, video_id: &VideoId) -> Result<bool, TrackerError> {
        Ok(self.videos.write().await.remove(video_id).is_some())
    }
}
