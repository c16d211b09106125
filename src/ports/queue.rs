use super::BoxError;
use crate::domain::jobs::{ConversionJob, JobId};
use crate::domain::video::VideoId;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(#[source] BoxError),
    #[error("job serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("job {0} holds no lease")]
    UnknownLease(JobId),
}

impl QueueError {
    pub fn backend(err: impl Into<BoxError>) -> Self {
        QueueError::Backend(err.into())
    }
}

/// Result of an enqueue: either a new job, or the job already active for
/// that video which the request was folded into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    Accepted(JobId),
    Coalesced(JobId),
}

impl Enqueued {
    pub fn job_id(&self) -> &JobId {
        match self {
            Enqueued::Accepted(id) | Enqueued::Coalesced(id) => id,
        }
    }
}

/// At-least-once queue of conversion jobs.
///
/// A video has at most one active job (queued, delayed or leased). A dequeued
/// job is leased to the caller; if the lease is neither acked, requeued nor
/// extended within the visibility timeout the job becomes visible again.
#[async_trait]
pub trait JobQueuePort: Send + Sync {
    async fn enqueue(&self, job: ConversionJob) -> Result<Enqueued, QueueError>;

    /// Wait up to `timeout` for a job. The returned job has `attempts`
    /// already incremented.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<ConversionJob>, QueueError>;

    async fn ack(&self, job_id: &JobId) -> Result<(), QueueError>;

    /// Release the lease and make `job` (with its updated counters) visible
    /// again after `delay`.
    async fn requeue(&self, job: ConversionJob, delay: Duration) -> Result<(), QueueError>;

    /// Push the lease deadline one visibility timeout into the future.
    async fn extend_lease(&self, job_id: &JobId) -> Result<(), QueueError>;

    /// Drop the waiting job of a video. Leased jobs are left to their worker.
    /// Returns whether a job was removed.
    async fn cancel(&self, video_id: &VideoId) -> Result<bool, QueueError>;
}
