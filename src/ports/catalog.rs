use super::BoxError;
use crate::domain::video::{NewVideo, Video, VideoId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog backend error: {0}")]
    Backend(#[source] BoxError),
    #[error("catalog record is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        CatalogError::Backend(err.into())
    }
}

/// Video records. Ids are assigned by the catalog.
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    async fn create(&self, video: NewVideo) -> Result<Video, CatalogError>;

    async fn get_video_record(&self, video_id: &VideoId) -> Result<Option<Video>, CatalogError>;

    /// Every video, newest first.
    async fn list(&self) -> Result<Vec<Video>, CatalogError>;

    /// Remove a record and return it.
    async fn delete(&self, video_id: &VideoId) -> Result<Option<Video>, CatalogError>;
}
