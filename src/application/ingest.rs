use crate::domain::jobs::ConversionJob;
use crate::domain::ladder::ResolutionLadder;
use crate::domain::video::{validate_source_extension, NewVideo, Video, VideoError, VideoId};
use crate::ports::catalog::{CatalogError, VideoCatalog};
use crate::ports::notify::StatusNotifier;
use crate::ports::queue::{Enqueued, JobQueuePort, QueueError};
use crate::ports::repository::{StatusTracker, TrackerError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("video {0} not found")]
    UnknownVideo(VideoId),
    #[error(transparent)]
    Video(#[from] VideoError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Turns a freshly created (or operator-retried) video into exactly one
/// active conversion job.
pub struct IngestionService {
    catalog: Arc<dyn VideoCatalog>,
    tracker: Arc<dyn StatusTracker>,
    queue: Arc<dyn JobQueuePort>,
    notifier: Arc<dyn StatusNotifier>,
    ladder: Arc<ResolutionLadder>,
}

impl IngestionService {
    pub fn new(
        catalog: Arc<dyn VideoCatalog>,
        tracker: Arc<dyn StatusTracker>,
        queue: Arc<dyn JobQueuePort>,
        notifier: Arc<dyn StatusNotifier>,
        ladder: Arc<ResolutionLadder>,
    ) -> Self {
        Self {
            catalog,
            tracker,
            queue,
            notifier,
            ladder,
        }
    }

    /// Create the catalog record, then trigger ingestion for it.
    pub async fn create_video(&self, video: NewVideo) -> Result<(Video, Enqueued), IngestError> {
        validate_source_extension(&video.source_path)?;
        let video = self.catalog.create(video).await?;
        tracing::info!(video_id = %video.id, title = %video.title, "video created");
        let enqueued = self.on_video_created(&video).await?;
        Ok((video, enqueued))
    }

    /// Register every ladder rendition and enqueue one job. A job already
    /// queued or running for the video absorbs the request.
    pub async fn on_video_created(&self, video: &Video) -> Result<Enqueued, IngestError> {
        let names: Vec<String> = self.ladder.names().map(str::to_owned).collect();
        let status = self.tracker.register(&video.id, &names).await?;
        self.notifier.notify_status_changed(&video.id, status.state());

        let job = ConversionJob::new(video.id.clone(), video.source_path.clone());
        let enqueued = self.queue.enqueue(job).await?;

        // A deletion that ran since the caller read the record has already
        // cleaned up, so undo what was just registered.
        if self.catalog.get_video_record(&video.id).await?.is_none() {
            tracing::warn!(video_id = %video.id, "video deleted during ingestion, rolling back");
            self.queue.cancel(&video.id).await?;
            self.tracker.remove(&video.id).await?;
            return Err(IngestError::UnknownVideo(video.id.clone()));
        }

        match &enqueued {
            Enqueued::Accepted(job_id) => {
                tracing::info!(video_id = %video.id, job_id = %job_id, "conversion job enqueued");
            }
            Enqueued::Coalesced(job_id) => {
                tracing::info!(
                    video_id = %video.id,
                    job_id = %job_id,
                    "conversion job already active, request coalesced"
                );
            }
        }
        Ok(enqueued)
    }

    /// Re-create the conversion job of an existing video. Failed renditions
    /// go back to Pending; Ready ones are left alone.
    pub async fn retry(&self, video_id: &VideoId) -> Result<Enqueued, IngestError> {
        let video = self
            .catalog
            .get_video_record(video_id)
            .await?
            .ok_or_else(|| IngestError::UnknownVideo(video_id.clone()))?;
        tracing::info!(video_id = %video_id, "retry requested");
        self.on_video_created(&video).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::Harness;
    use crate::domain::status::RenditionStatus;
    use crate::domain::video::Category;

    #[tokio::test]
    async fn test_create_video_registers_and_enqueues_once() {
        let h = Harness::new();
        let (video, enqueued) = h.ingest.create_video(h.new_video("movie.mp4")).await.unwrap();
        assert!(matches!(enqueued, Enqueued::Accepted(_)));

        let status = h.tracker.get(&video.id).await.unwrap().unwrap();
        assert_eq!(status.renditions.len(), 3);
        assert!(status
            .renditions
            .values()
            .all(|s| *s == RenditionStatus::Pending));
        assert_eq!(h.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_coalesce() {
        let h = Harness::new();
        let (video, first) = h.ingest.create_video(h.new_video("movie.mp4")).await.unwrap();

        let triggers = (0..8).map(|_| h.ingest.on_video_created(&video));
        let results = futures::future::join_all(triggers).await;
        for result in results {
            assert_eq!(result.unwrap(), Enqueued::Coalesced(first.job_id().clone()));
        }
        assert_eq!(h.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unsupported_extension() {
        let h = Harness::new();
        let mut video = h.new_video("notes.txt");
        video.category = Category::Tutorial;
        let err = h.ingest.create_video(video).await.unwrap_err();
        assert!(matches!(err, IngestError::Video(VideoError::UnsupportedExtension)));
        assert!(h.catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_for_deleted_video_rolls_back() {
        let h = Harness::new();
        let (video, _) = h.ingest.create_video(h.new_video("movie.mp4")).await.unwrap();
        h.drain().await;

        // Deleted after the caller looked the record up.
        h.catalog.delete(&video.id).await.unwrap();
        h.cleanup.on_video_deleted(&video.id).await;

        let err = h.ingest.on_video_created(&video).await.unwrap_err();
        assert!(matches!(err, IngestError::UnknownVideo(_)));
        assert!(h.tracker.get(&video.id).await.unwrap().is_none());
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn test_retry_unknown_video() {
        let h = Harness::new();
        let err = h
            .ingest
            .retry(&VideoId::parse("77").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnknownVideo(_)));
    }
}
