//! Redis JobQueuePort implementation.
//!
//! Job bodies live under the job prefix; the ready list, the delayed set
//! and the lease set only hold ids. The video's active key holds the id of
//! the job that owns it, so that a video never has two active jobs.
//! Each operation is one script: an id is always in exactly one of ready,
//! delayed or leased until it is acked or cancelled.

use super::error::RedisAdapterError;
use super::pool::RedisPool;
use super::now_millis;
use crate::domain::jobs::{ConversionJob, JobId};
use crate::domain::video::VideoId;
use crate::ports::queue::{Enqueued, JobQueuePort, QueueError};
use async_trait::async_trait;
use deadpool_redis::redis::{AsyncCommands, Script};
use std::time::Duration;
use tokio::time::Instant;

/// Claim the active key, store the body and list the id. An active key
/// whose job body is gone is stale and gets taken over.
const ENQUEUE: &str = r#"
local owner = redis.call('GET', KEYS[1])
if owner and redis.call('EXISTS', ARGV[3] .. owner) == 1 then
  return {0, owner}
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
redis.call('LPUSH', KEYS[3], ARGV[1])
return {1, ARGV[1]}
"#;

/// Promote due delayed jobs and expired leases, then pop one id and lease
/// it. Replies `{expired}` or `{expired, id, body}`.
const DEQUEUE: &str = r#"
local expired = 0
for i, set in ipairs({KEYS[1], KEYS[2]}) do
  for _, id in ipairs(redis.call('ZRANGEBYSCORE', set, '-inf', ARGV[1])) do
    redis.call('ZREM', set, id)
    redis.call('LPUSH', KEYS[3], id)
    if i == 2 then expired = expired + 1 end
  end
end
while true do
  local id = redis.call('RPOP', KEYS[3])
  if not id then return {tostring(expired)} end
  local body = redis.call('GET', ARGV[3] .. id)
  if body then
    redis.call('ZADD', KEYS[2], ARGV[2], id)
    return {tostring(expired), id, body}
  end
end
"#;

const ACK: &str = r#"
local job_key = ARGV[2] .. ARGV[1]
local body = redis.call('GET', job_key)
redis.call('LREM', KEYS[1], 0, ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('ZREM', KEYS[3], ARGV[1])
redis.call('DEL', job_key)
if body then
  local active = ARGV[3] .. cjson.decode(body).video_id
  if redis.call('GET', active) == ARGV[1] then redis.call('DEL', active) end
end
return 1
"#;

/// `ARGV[3]` is the due time in milliseconds, `0` for immediately.
const REQUEUE: &str = r#"
if redis.call('EXISTS', KEYS[4]) == 0 then return 0 end
redis.call('SET', KEYS[4], ARGV[2])
redis.call('LREM', KEYS[1], 0, ARGV[1])
redis.call('ZREM', KEYS[2], ARGV[1])
redis.call('ZREM', KEYS[3], ARGV[1])
if ARGV[3] == '0' then
  redis.call('LPUSH', KEYS[1], ARGV[1])
else
  redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
end
return 1
"#;

const EXTEND_LEASE: &str = r#"
if not redis.call('ZSCORE', KEYS[1], ARGV[1]) then return 0 end
redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])
return 1
"#;

/// Drop the video's job unless a worker holds it.
const CANCEL: &str = r#"
local owner = redis.call('GET', KEYS[4])
if not owner then return 0 end
if redis.call('ZSCORE', KEYS[3], owner) then return 0 end
redis.call('LREM', KEYS[1], 0, owner)
redis.call('ZREM', KEYS[2], owner)
redis.call('DEL', ARGV[1] .. owner)
redis.call('DEL', KEYS[4])
return 1
"#;

/// Longest wait between two polls of an empty ready list.
const POLL_STEP: Duration = Duration::from_millis(200);

fn enqueue_outcome(claimed: i64, job_id: String) -> Enqueued {
    if claimed == 1 {
        Enqueued::Accepted(JobId::from(job_id))
    } else {
        Enqueued::Coalesced(JobId::from(job_id))
    }
}

/// Number of expired leases and the leased job, if any.
type DequeueReply = (u64, Option<(JobId, String)>);

fn parse_dequeue_reply(reply: Vec<String>) -> Result<DequeueReply, QueueError> {
    let malformed = || QueueError::backend("malformed dequeue reply");
    let mut items = reply.into_iter();
    let expired = items
        .next()
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(malformed)?;
    match (items.next(), items.next(), items.next()) {
        (None, None, None) => Ok((expired, None)),
        (Some(id), Some(body), None) => Ok((expired, Some((JobId::from(id), body)))),
        _ => Err(malformed()),
    }
}

fn millis_from_now(delay: Duration) -> i64 {
    now_millis() + delay.as_millis() as i64
}

#[async_trait]
impl JobQueuePort for RedisPool {
    async fn enqueue(&self, job: ConversionJob) -> Result<Enqueued, QueueError> {
        let mut conn = self.conn().await?;
        let keys = self.keys();
        let json = serde_json::to_string(&job)?;

        let (claimed, job_id): (i64, String) = Script::new(ENQUEUE)
            .key(keys.active(&job.video_id))
            .key(keys.job(&job.id))
            .key(keys.ready())
            .arg(job.id.as_str())
            .arg(json)
            .arg(keys.job_prefix())
            .invoke_async(&mut conn)
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(enqueue_outcome(claimed, job_id))
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<ConversionJob>, QueueError> {
        let mut conn = self.conn().await?;
        let keys = self.keys();
        let script = Script::new(DEQUEUE);
        let give_up = Instant::now() + timeout;

        loop {
            let reply: Vec<String> = script
                .key(keys.delayed())
                .key(keys.leases())
                .key(keys.ready())
                .arg(now_millis())
                .arg(millis_from_now(self.visibility_timeout))
                .arg(keys.job_prefix())
                .invoke_async(&mut conn)
                .await
                .map_err(RedisAdapterError::from)?;
            let (expired, leased) = parse_dequeue_reply(reply)?;
            if expired > 0 {
                tracing::warn!(expired, "leases expired, jobs visible again");
            }

            if let Some((id, body)) = leased {
                let mut job: ConversionJob = serde_json::from_str(&body)?;
                job.attempts += 1;
                conn.set::<_, _, ()>(keys.job(&id), serde_json::to_string(&job)?)
                    .await
                    .map_err(RedisAdapterError::from)?;
                return Ok(Some(job));
            }

            let now = Instant::now();
            if now >= give_up {
                return Ok(None);
            }
            tokio::time::sleep(POLL_STEP.min(give_up - now)).await;
        }
    }

    async fn ack(&self, job_id: &JobId) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let keys = self.keys();
        Script::new(ACK)
            .key(keys.ready())
            .key(keys.delayed())
            .key(keys.leases())
            .arg(job_id.as_str())
            .arg(keys.job_prefix())
            .arg(keys.active_prefix())
            .invoke_async::<_, ()>(&mut conn)
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(())
    }

    async fn requeue(&self, job: ConversionJob, delay: Duration) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let keys = self.keys();
        let due = if delay.is_zero() {
            0
        } else {
            millis_from_now(delay)
        };

        let requeued: i64 = Script::new(REQUEUE)
            .key(keys.ready())
            .key(keys.delayed())
            .key(keys.leases())
            .key(keys.job(&job.id))
            .arg(job.id.as_str())
            .arg(serde_json::to_string(&job)?)
            .arg(due)
            .invoke_async(&mut conn)
            .await
            .map_err(RedisAdapterError::from)?;
        if requeued == 1 {
            Ok(())
        } else {
            Err(QueueError::UnknownLease(job.id))
        }
    }

    async fn extend_lease(&self, job_id: &JobId) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let extended: i64 = Script::new(EXTEND_LEASE)
            .key(self.keys().leases())
            .arg(job_id.as_str())
            .arg(millis_from_now(self.visibility_timeout))
            .invoke_async(&mut conn)
            .await
            .map_err(RedisAdapterError::from)?;
        if extended == 1 {
            Ok(())
        } else {
            Err(QueueError::UnknownLease(job_id.clone()))
        }
    }

    async fn cancel(&self, video_id: &VideoId) -> Result<bool, QueueError> {
        let mut conn = self.conn().await?;
        let keys = self.keys();
        let cancelled: i64 = Script::new(CANCEL)
            .key(keys.ready())
            .key(keys.delayed())
            .key(keys.leases())
            .key(keys.active(video_id))
            .arg(keys.job_prefix())
            .invoke_async(&mut conn)
            .await
            .map_err(RedisAdapterError::from)?;
        Ok(cancelled == 1)
    }
}
