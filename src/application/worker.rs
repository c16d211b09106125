use crate::domain::jobs::{ConversionJob, JobId, RetryPolicy};
use crate::domain::ladder::{LadderEntry, ResolutionLadder};
use crate::domain::status::RenditionStatus;
use crate::domain::video::VideoId;
use crate::ports::encoder::Encoder;
use crate::ports::notify::StatusNotifier;
use crate::ports::queue::{JobQueuePort, QueueError};
use crate::ports::repository::{StatusTracker, TrackerError};
use crate::ports::storage::{ContentStore, StoreError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub retry: RetryPolicy,
    /// How long one dequeue waits before the loop checks for shutdown.
    pub poll_timeout: Duration,
    /// Lease extension period while a job is being processed.
    pub heartbeat_interval: Duration,
}

enum RenditionOutcome {
    Ready,
    Failed { reason: String, terminal: bool },
    Deleted,
}

enum JobOutcome {
    Done,
    Retry(Duration),
    Deleted,
}

pub struct WorkerService {
    queue: Arc<dyn JobQueuePort>,
    tracker: Arc<dyn StatusTracker>,
    store: Arc<dyn ContentStore>,
    encoder: Arc<dyn Encoder>,
    notifier: Arc<dyn StatusNotifier>,
    ladder: Arc<ResolutionLadder>,
    settings: WorkerSettings,
}

impl WorkerService {
    pub fn new(
        queue: Arc<dyn JobQueuePort>,
        tracker: Arc<dyn StatusTracker>,
        store: Arc<dyn ContentStore>,
        encoder: Arc<dyn Encoder>,
        notifier: Arc<dyn StatusNotifier>,
        ladder: Arc<ResolutionLadder>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            tracker,
            store,
            encoder,
            notifier,
            ladder,
            settings,
        }
    }

    pub async fn run_worker_loop(&self, worker_id: usize, shutdown: CancellationToken) {
        tracing::info!(worker_id, "worker started");
        // A running job is never interrupted; shutdown is checked between jobs.
        while !shutdown.is_cancelled() {
            if let Err(e) = self.run_once(worker_id).await {
                tracing::error!(worker_id, error = %e, "queue error");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
        tracing::info!(worker_id, "worker stopped");
    }

    /// Dequeue and process at most one job. Returns whether a job was taken.
    pub async fn run_once(&self, worker_id: usize) -> Result<bool, QueueError> {
        let Some(job) = self.queue.dequeue(self.settings.poll_timeout).await? else {
            return Ok(false);
        };

        let span = tracing::info_span!(
            "job",
            worker_id,
            job_id = %job.id,
            video_id = %job.video_id,
            attempt = job.attempts
        );
        let heartbeat = CancellationToken::new();
        let _stop_heartbeat = heartbeat.clone().drop_guard();
        self.spawn_heartbeat(job.id.clone(), heartbeat);

        let job_id = job.id.clone();
        if let Err(e) = self.process_job(job).instrument(span).await {
            // The lease runs out and the job becomes visible again.
            tracing::error!(worker_id, job_id = %job_id, error = %e, "job aborted");
        }
        Ok(true)
    }

    fn spawn_heartbeat(&self, job_id: JobId, stop: CancellationToken) {
        let queue = self.queue.clone();
        let interval = self.settings.heartbeat_interval;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = queue.extend_lease(&job_id).await {
                            tracing::warn!(job_id = %job_id, error = %e, "lease heartbeat failed");
                        }
                    }
                }
            }
        });
    }

    async fn process_job(&self, mut job: ConversionJob) -> Result<(), WorkerError> {
        tracing::info!(source = %job.source_path.display(), "job started");
        match self.run_ladder(&mut job).await? {
            JobOutcome::Done => {
                tracing::info!("job finished");
                self.queue.ack(&job.id).await?;
            }
            JobOutcome::Retry(delay) => {
                tracing::info!(delay_secs = delay.as_secs(), "job requeued");
                self.queue.requeue(job, delay).await?;
            }
            JobOutcome::Deleted => {
                tracing::info!("video deleted, job dropped");
                self.queue.ack(&job.id).await?;
            }
        }
        Ok(())
    }

    async fn run_ladder(&self, job: &mut ConversionJob) -> Result<JobOutcome, WorkerError> {
        let video_id = job.video_id.clone();
        let mut retry_after: Option<u32> = None;

        for entry in self.ladder.entries() {
            let Some(status) = self.tracker.get(&video_id).await? else {
                return Ok(JobOutcome::Deleted);
            };
            let current = match status.rendition(&entry.name) {
                Some(current) => current.clone(),
                // Ladder grew since the video was registered.
                None => {
                    self.tracker
                        .register(&video_id, &[entry.name.clone()])
                        .await?;
                    RenditionStatus::Pending
                }
            };

            match current {
                RenditionStatus::Ready => {
                    tracing::debug!(resolution = %entry.name, "rendition ready, skipped");
                    continue;
                }
                RenditionStatus::Failed { .. } => continue,
                RenditionStatus::Pending | RenditionStatus::Encoding => {}
            }
            // Pending with an exhausted counter means an operator retry.
            if self.settings.retry.is_exhausted(job.failures(&entry.name)) {
                job.rendition_attempts.remove(&entry.name);
            }

            match self.encode_rendition(job, entry).await? {
                RenditionOutcome::Ready => {}
                RenditionOutcome::Deleted => return Ok(JobOutcome::Deleted),
                RenditionOutcome::Failed {
                    reason,
                    terminal: true,
                } => {
                    tracing::error!(resolution = %entry.name, reason = %reason, "terminal failure");
                    if !self.fail_remaining(&video_id, &reason).await? {
                        return Ok(JobOutcome::Deleted);
                    }
                    return Ok(JobOutcome::Done);
                }
                RenditionOutcome::Failed {
                    reason,
                    terminal: false,
                } => {
                    let failures = job.record_failure(&entry.name, reason.clone());
                    if self.settings.retry.is_exhausted(failures) {
                        tracing::error!(
                            resolution = %entry.name,
                            attempt = failures,
                            reason = %reason,
                            "encoding failed, retries exhausted"
                        );
                        let failed = RenditionStatus::failed(reason);
                        if !self.transition(&video_id, &entry.name, failed).await? {
                            return Ok(JobOutcome::Deleted);
                        }
                    } else {
                        tracing::warn!(
                            resolution = %entry.name,
                            attempt = failures,
                            reason = %reason,
                            "encoding failed, will retry"
                        );
                        if !self
                            .transition(&video_id, &entry.name, RenditionStatus::Pending)
                            .await?
                        {
                            return Ok(JobOutcome::Deleted);
                        }
                        retry_after = Some(retry_after.map_or(failures, |n| n.max(failures)));
                    }
                }
            }
        }

        // Renditions reset by a coalesced operator retry also need a pass.
        let Some(status) = self.tracker.get(&video_id).await? else {
            return Ok(JobOutcome::Deleted);
        };
        let unfinished = status.renditions.values().any(|s| s.is_in_progress());
        Ok(match (retry_after, unfinished) {
            (Some(failures), _) => JobOutcome::Retry(self.settings.retry.delay_after(failures)),
            (None, true) => JobOutcome::Retry(Duration::ZERO),
            (None, false) => JobOutcome::Done,
        })
    }

    async fn encode_rendition(
        &self,
        job: &ConversionJob,
        entry: &LadderEntry,
    ) -> Result<RenditionOutcome, WorkerError> {
        let video_id = &job.video_id;
        let resolution = entry.name.as_str();

        if !self
            .transition(video_id, resolution, RenditionStatus::Encoding)
            .await?
        {
            return Ok(RenditionOutcome::Deleted);
        }

        let staging = self.store.stage(video_id, resolution).await?;
        tracing::info!(resolution, "encoding started");
        let started = Instant::now();
        let manifest = match self
            .encoder
            .encode(&job.source_path, entry, staging.path())
            .await
        {
            Ok(manifest) => manifest,
            Err(e) => {
                return Ok(RenditionOutcome::Failed {
                    reason: e.to_string(),
                    terminal: e.is_terminal(),
                })
            }
        };
        tracing::info!(
            resolution,
            segments = manifest.segments.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "encoding finished"
        );

        if self.tracker.get(video_id).await?.is_none() {
            tracing::info!(resolution, "video deleted during encode, publish aborted");
            return Ok(RenditionOutcome::Deleted);
        }
        if let Err(e) = self.store.publish(video_id, resolution, staging, &manifest).await {
            return Ok(RenditionOutcome::Failed {
                reason: format!("publish failed: {}", e),
                terminal: false,
            });
        }

        // Marking Ready fails if cleanup ran while publishing.
        if !self
            .transition(video_id, resolution, RenditionStatus::Ready)
            .await?
        {
            tracing::warn!(resolution, "video deleted while publishing, removing artifacts");
            self.store.remove_video(video_id).await?;
            return Ok(RenditionOutcome::Deleted);
        }
        tracing::info!(resolution, "rendition published");
        Ok(RenditionOutcome::Ready)
    }

    /// Mark every rendition that is not Ready as Failed. Returns false if
    /// the video disappeared.
    async fn fail_remaining(&self, video_id: &VideoId, reason: &str) -> Result<bool, WorkerError> {
        for entry in self.ladder.entries() {
            match self.tracker.get_rendition(video_id, &entry.name).await? {
                Some(RenditionStatus::Ready) | Some(RenditionStatus::Failed { .. }) => {}
                Some(_) => {
                    let failed = RenditionStatus::failed(reason);
                    if !self.transition(video_id, &entry.name, failed).await? {
                        return Ok(false);
                    }
                }
                None => return Ok(self.tracker.get(video_id).await?.is_some()),
            }
        }
        Ok(true)
    }

    /// Write a rendition status and publish the resulting video state.
    /// Returns false if the video is no longer tracked.
    async fn transition(
        &self,
        video_id: &VideoId,
        resolution: &str,
        status: RenditionStatus,
    ) -> Result<bool, WorkerError> {
        match self.tracker.set_rendition(video_id, resolution, status).await {
            Ok(()) => {}
            Err(TrackerError::UnknownVideo(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        if let Some(state) = self.tracker.state(video_id).await? {
            self.notifier.notify_status_changed(video_id, state);
        }
        Ok(true)
    }
}

/// Start `workers` loops sharing one service.
pub fn spawn_workers(
    service: Arc<WorkerService>,
    workers: usize,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..workers)
        .map(|worker_id| {
            let service = service.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { service.run_worker_loop(worker_id, shutdown).await })
        })
        .collect()
}
