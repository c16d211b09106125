use crate::domain::addressing::{rendition_dir, segment_name, video_dir, MANIFEST_NAME};
use crate::domain::hls::Manifest;
use crate::domain::video::VideoId;
use crate::ports::storage::{ContentStore, SegmentFile, StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STAGING_DIR: &str = ".staging";
const MANIFEST_TEMP: &str = ".index.m3u8.publish";

/// Content store rooted at a local directory. Staging directories live under
/// the same root so that publishing is a series of renames.
#[derive(Clone, Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }
}

async fn remove_dir_if_exists(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

#[async_trait]
impl ContentStore for FsStore {
    async fn stage(&self, video_id: &VideoId, resolution: &str) -> Result<TempDir, StoreError> {
        let staging_root = self.staging_root();
        tokio::fs::create_dir_all(&staging_root)
            .await
            .map_err(|e| StoreError::io(&staging_root, e))?;
        tempfile::Builder::new()
            .prefix(&format!("{}-{}-", video_id, resolution))
            .tempdir_in(&staging_root)
            .map_err(|e| StoreError::io(&staging_root, e))
    }

    async fn publish(
        &self,
        video_id: &VideoId,
        resolution: &str,
        staging: TempDir,
        manifest: &Manifest,
    ) -> Result<(), StoreError> {
        let target = self.root.join(rendition_dir(video_id, resolution));
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| StoreError::io(&target, e))?;

        for segment in &manifest.segments {
            let name = segment.uri();
            let from = staging.path().join(&name);
            match tokio::fs::rename(&from, target.join(&name)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(StoreError::MissingArtifact(name));
                }
                Err(e) => return Err(StoreError::io(&from, e)),
            }
        }

        // The manifest goes last: once it is visible every segment is too.
        let temp = target.join(MANIFEST_TEMP);
        manifest
            .write_to(&temp)
            .await
            .map_err(|e| StoreError::io(&temp, e))?;
        let final_path = target.join(MANIFEST_NAME);
        tokio::fs::rename(&temp, &final_path)
            .await
            .map_err(|e| StoreError::io(&final_path, e))?;

        tracing::debug!(
            video_id = %video_id,
            resolution,
            segments = manifest.segments.len(),
            "rendition published"
        );
        Ok(())
    }

    async fn read_manifest(
        &self,
        video_id: &VideoId,
        resolution: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self
            .root
            .join(rendition_dir(video_id, resolution))
            .join(MANIFEST_NAME);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    async fn open_segment(
        &self,
        video_id: &VideoId,
        resolution: &str,
        index: u32,
    ) -> Result<Option<SegmentFile>, StoreError> {
        let path = self
            .root
            .join(rendition_dir(video_id, resolution))
            .join(segment_name(index));
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        let len = file
            .metadata()
            .await
            .map_err(|e| StoreError::io(&path, e))?
            .len();
        Ok(Some(SegmentFile { file, len }))
    }

    async fn remove_rendition(&self, video_id: &VideoId, resolution: &str) -> Result<(), StoreError> {
        remove_dir_if_exists(&self.root.join(rendition_dir(video_id, resolution))).await
    }

    async fn remove_video(&self, video_id: &VideoId) -> Result<(), StoreError> {
        remove_dir_if_exists(&self.root.join(video_dir(video_id))).await
    }
}
