//! Redis StatusTracker implementation: one hash per video, field per
//! rendition, value is the JSON-encoded `RenditionStatus`.

use super::error::RedisAdapterError;
use super::pool::RedisPool;
use crate::domain::status::{RenditionStatus, VideoStatus};
use crate::domain::video::VideoId;
use crate::ports::repository::{StatusTracker, TrackerError};
use async_trait::async_trait;
use deadpool_redis::redis::{AsyncCommands, Script};
use std::collections::{BTreeMap, HashMap};

/// Replace a field only if the hash exists and the field still holds the
/// value the caller read. Returns -1 when the video is gone, 0 on a lost race.
const COMPARE_AND_SET: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then return -1 end
if redis.call('HGET', KEYS[1], ARGV[1]) ~= ARGV[2] then return 0 end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
return 1
"#;

/// Registration in one step: missing and failed renditions become
/// `ARGV[1]` (pending), every other field is left as it is. Replies with
/// the whole hash. Mirrors `register_rendition`.
const REGISTER: &str = r#"
for i = 2, #ARGV do
  local raw = redis.call('HGET', KEYS[1], ARGV[i])
  if not raw or cjson.decode(raw).state == 'failed' then
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[1])
  end
end
return redis.call('HGETALL', KEYS[1])
"#;

const MAX_CAS_ROUNDS: usize = 8;

fn decode(fields: HashMap<String, String>) -> Result<Option<VideoStatus>, TrackerError> {
    if fields.is_empty() {
        return Ok(None);
    }
    let mut renditions = BTreeMap::new();
    for (name, json) in fields {
        let status: RenditionStatus =
            serde_json::from_str(&json).map_err(TrackerError::backend)?;
        renditions.insert(name, status);
    }
    Ok(Some(VideoStatus { renditions }))
}

#[async_trait]
impl StatusTracker for RedisPool {
    async fn register(
        &self,
        video_id: &VideoId,
        renditions: &[String],
    ) -> Result<VideoStatus, TrackerError> {
        let mut conn = self.conn().await?;
        let pending =
            serde_json::to_string(&RenditionStatus::Pending).map_err(TrackerError::backend)?;
        let script = Script::new(REGISTER);
        let mut invocation = script.prepare_invoke();
        invocation.key(self.keys().status(video_id)).arg(pending);
        for name in renditions {
            invocation.arg(name);
        }
        let fields: HashMap<String, String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(decode(fields)?.unwrap_or(VideoStatus {
            renditions: BTreeMap::new(),
        }))
    }

    async fn get(&self, video_id: &VideoId) -> Result<Option<VideoStatus>, TrackerError> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = conn
            .hgetall(self.keys().status(video_id))
            .await
            .map_err(RedisAdapterError::from)?;
        decode(fields)
    }

    async fn get_rendition(
        &self,
        video_id: &VideoId,
        resolution: &str,
    ) -> Result<Option<RenditionStatus>, TrackerError> {
        let mut conn = self.conn().await?;
        let json: Option<String> = conn
            .hget(self.keys().status(video_id), resolution)
            .await
            .map_err(RedisAdapterError::from)?;
        json.map(|j| serde_json::from_str(&j).map_err(TrackerError::backend))
            .transpose()
    }

    async fn set_rendition(
        &self,
        video_id: &VideoId,
        resolution: &str,
        status: RenditionStatus,
    ) -> Result<(), TrackerError> {
        let mut conn = self.conn().await?;
        let key = self.keys().status(video_id);
        let next = serde_json::to_string(&status).map_err(TrackerError::backend)?;
        let script = Script::new(COMPARE_AND_SET);

        for _ in 0..MAX_CAS_ROUNDS {
            let exists: bool = conn.exists(&key).await.map_err(RedisAdapterError::from)?;
            if !exists {
                return Err(TrackerError::UnknownVideo(video_id.clone()));
            }
            let raw: Option<String> = conn
                .hget(&key, resolution)
                .await
                .map_err(RedisAdapterError::from)?;
            let Some(raw) = raw else {
                return Err(TrackerError::UnknownRendition {
                    video_id: video_id.clone(),
                    resolution: resolution.to_string(),
                });
            };
            let current: RenditionStatus =
                serde_json::from_str(&raw).map_err(TrackerError::backend)?;
            if current == status {
                return Ok(());
            }
            if !current.can_transition_to(&status) {
                return Err(TrackerError::IllegalTransition {
                    video_id: video_id.clone(),
                    resolution: resolution.to_string(),
                    from: current,
                    to: status,
                });
            }

            let outcome: i64 = script
                .key(&key)
                .arg(resolution)
                .arg(&raw)
                .arg(&next)
                .invoke_async(&mut conn)
                .await
                .map_err(RedisAdapterError::from)?;
            match outcome {
                1 => return Ok(()),
                -1 => return Err(TrackerError::UnknownVideo(video_id.clone())),
                _ => continue,
            }
        }
        Err(TrackerError::backend(format!(
            "contention updating {}/{}",
            video_id, resolution
        )))
    }

    async fn remove(&self, video_id: &VideoId) -> Result<bool, TrackerError> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn
            .del(self.keys().status(video_id))
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(removed > 0)
    }
}
