//! Redis VideoCatalog implementation.

use super::error::RedisAdapterError;
use super::pool::RedisPool;
use crate::domain::video::{NewVideo, Video, VideoId};
use crate::ports::catalog::{CatalogError, VideoCatalog};
use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::redis::{self, AsyncCommands};

#[async_trait]
impl VideoCatalog for RedisPool {
    async fn create(&self, video: NewVideo) -> Result<Video, CatalogError> {
        let mut conn = self.conn().await?;
        let keys = self.keys();
        let seq: u64 = conn
            .incr(keys.video_sequence(), 1u64)
            .await
            .map_err(RedisAdapterError::from)?;
        let id = VideoId::parse(&seq.to_string()).map_err(CatalogError::backend)?;
        let video = video.into_video(id.clone(), Utc::now());

        // Record and index together, so a listed id always has a record.
        redis::pipe()
            .atomic()
            .set(keys.video(id.as_str()), serde_json::to_string(&video)?)
            .ignore()
            .zadd(keys.video_index(), id.as_str(), video.created_at.timestamp_millis())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(video)
    }

    async fn get_video_record(&self, video_id: &VideoId) -> Result<Option<Video>, CatalogError> {
        let mut conn = self.conn().await?;
        let json: Option<String> = conn
            .get(self.keys().video(video_id.as_str()))
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    async fn list(&self) -> Result<Vec<Video>, CatalogError> {
        let mut conn = self.conn().await?;
        let keys = self.keys();
        let ids: Vec<String> = conn
            .zrevrange(keys.video_index(), 0, -1)
            .await
            .map_err(RedisAdapterError::from)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let record_keys: Vec<String> = ids.iter().map(|id| keys.video(id)).collect();
        let records: Vec<Option<String>> = conn
            .mget(&record_keys)
            .await
            .map_err(RedisAdapterError::from)?;
        let mut videos = Vec::with_capacity(records.len());
        for json in records.into_iter().flatten() {
            videos.push(serde_json::from_str(&json)?);
        }
        Ok(videos)
    }

    async fn delete(&self, video_id: &VideoId) -> Result<Option<Video>, CatalogError> {
        let mut conn = self.conn().await?;
        let keys = self.keys();
        let key = keys.video(video_id.as_str());
        // GETDEL-like: only the caller that removed the record gets it back.
        let (json, _): (Option<String>, i64) = redis::pipe()
            .atomic()
            .get(&key)
            .del(&key)
            .ignore()
            .zrem(keys.video_index(), video_id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }
}
