use super::video::VideoId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Request to transcode one video across the whole ladder.
///
/// Retry bookkeeping travels with the job so that every requeue path
/// (encode failure, lost lease) sees the same counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: JobId,
    pub video_id: VideoId,
    pub source_path: PathBuf,
    pub enqueued_at: DateTime<Utc>,
    /// Number of times the job has been handed to a worker.
    pub attempts: u32,
    /// Failed encode attempts per rendition name.
    #[serde(default)]
    pub rendition_attempts: BTreeMap<String, u32>,
    pub last_error: Option<String>,
}

impl ConversionJob {
    pub fn new(video_id: VideoId, source_path: PathBuf) -> Self {
        Self {
            id: JobId::new(),
            video_id,
            source_path,
            enqueued_at: Utc::now(),
            attempts: 0,
            rendition_attempts: BTreeMap::new(),
            last_error: None,
        }
    }

    /// Record a failed encode of `resolution` and return its attempt count.
    pub fn record_failure(&mut self, resolution: &str, error: impl Into<String>) -> u32 {
        let count = self
            .rendition_attempts
            .entry(resolution.to_string())
            .or_insert(0);
        *count += 1;
        self.last_error = Some(error.into());
        *count
    }

    pub fn failures(&self, resolution: &str) -> u32 {
        self.rendition_attempts.get(resolution).copied().unwrap_or(0)
    }
}

/// Bounded retry with a fixed backoff schedule; the last step repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }

    /// Delay before the retry that follows the `failures`-th failure.
    pub fn delay_after(&self, failures: u32) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let idx = (failures.saturating_sub(1) as usize).min(self.backoff.len() - 1);
        self.backoff[idx]
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: vec![
                Duration::from_secs(10),
                Duration::from_secs(30),
                Duration::from_secs(60),
            ],
        }
    }
}
