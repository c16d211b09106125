use crate::domain::video::{Video, VideoId};
use crate::ports::catalog::{CatalogError, VideoCatalog};
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::StatusTracker;
use crate::ports::storage::ContentStore;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

/// Removes everything the pipeline produced for a deleted video. Partial
/// failures are logged and never fail the deletion.
pub struct CleanupService {
    catalog: Arc<dyn VideoCatalog>,
    tracker: Arc<dyn StatusTracker>,
    queue: Arc<dyn JobQueuePort>,
    store: Arc<dyn ContentStore>,
}

impl CleanupService {
    pub fn new(
        catalog: Arc<dyn VideoCatalog>,
        tracker: Arc<dyn StatusTracker>,
        queue: Arc<dyn JobQueuePort>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            catalog,
            tracker,
            queue,
            store,
        }
    }

    /// Delete the catalog record, then its artifacts and uploaded files.
    /// Returns the deleted record, `None` if there was none.
    pub async fn delete_video(&self, video_id: &VideoId) -> Result<Option<Video>, CatalogError> {
        let Some(video) = self.catalog.delete(video_id).await? else {
            return Ok(None);
        };
        tracing::info!(video_id = %video_id, "video deleted");
        self.on_video_deleted(video_id).await;

        remove_file_best_effort(video_id, &video.source_path).await;
        if let Some(thumbnail) = &video.thumbnail_path {
            remove_file_best_effort(video_id, thumbnail).await;
        }
        Ok(Some(video))
    }

    /// Forget the video's rendition state, drop its waiting job and delete
    /// its artifacts. Safe to call when nothing was ever produced.
    pub async fn on_video_deleted(&self, video_id: &VideoId) {
        // Tracker first: an in-flight worker checks it before publishing.
        if let Err(e) = self.tracker.remove(video_id).await {
            tracing::error!(video_id = %video_id, error = %e, "failed to remove rendition status");
        }
        match self.queue.cancel(video_id).await {
            Ok(true) => tracing::info!(video_id = %video_id, "queued conversion job cancelled"),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(video_id = %video_id, error = %e, "failed to cancel conversion job")
            }
        }
        if let Err(e) = self.store.remove_video(video_id).await {
            tracing::error!(video_id = %video_id, error = %e, "failed to remove artifacts");
        }
    }
}

async fn remove_file_best_effort(video_id: &VideoId, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(video_id = %video_id, path = %path.display(), "file removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            video_id = %video_id,
            path = %path.display(),
            error = %e,
            "failed to remove file"
        ),
    }
}
