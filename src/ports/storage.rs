use crate::domain::hls::Manifest;
use crate::domain::video::VideoId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("staged rendition is missing {0}")]
    MissingArtifact(String),
}

impl StoreError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// An opened segment ready to be streamed.
#[derive(Debug)]
pub struct SegmentFile {
    pub file: tokio::fs::File,
    pub len: u64,
}

/// Content-addressed artifact storage.
///
/// Encoders write into a staging directory; `publish` moves the segments
/// under `{video_id}/{resolution}/` and renames the manifest into place last,
/// so a reader that finds `index.m3u8` also finds every segment it lists.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fresh private directory for one encode. Dropped on failure.
    async fn stage(&self, video_id: &VideoId, resolution: &str) -> Result<TempDir, StoreError>;

    async fn publish(
        &self,
        video_id: &VideoId,
        resolution: &str,
        staging: TempDir,
        manifest: &Manifest,
    ) -> Result<(), StoreError>;

    async fn read_manifest(
        &self,
        video_id: &VideoId,
        resolution: &str,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    async fn open_segment(
        &self,
        video_id: &VideoId,
        resolution: &str,
        index: u32,
    ) -> Result<Option<SegmentFile>, StoreError>;

    async fn remove_rendition(&self, video_id: &VideoId, resolution: &str) -> Result<(), StoreError>;

    /// Delete every artifact of a video. Missing artifacts are not an error.
    async fn remove_video(&self, video_id: &VideoId) -> Result<(), StoreError>;
}
