//! In-memory JobQueuePort with visibility-timeout leases.

use crate::domain::jobs::{ConversionJob, JobId};
use crate::domain::video::VideoId;
use crate::ports::queue::{Enqueued, JobQueuePort, QueueError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct State {
    ready: VecDeque<JobId>,
    delayed: Vec<(Instant, JobId)>,
    leases: HashMap<JobId, Instant>,
    jobs: HashMap<JobId, ConversionJob>,
    active: HashMap<VideoId, JobId>,
}

impl State {
    /// Move due delayed jobs and expired leases back to the ready list and
    /// return the earliest instant something else becomes due.
    fn promote(&mut self, now: Instant) -> Option<Instant> {
        let mut next = None::<Instant>;
        let mut keep = Vec::with_capacity(self.delayed.len());
        for (at, id) in self.delayed.drain(..) {
            if at <= now {
                self.ready.push_back(id);
            } else {
                next = Some(next.map_or(at, |n| n.min(at)));
                keep.push((at, id));
            }
        }
        self.delayed = keep;

        let expired: Vec<JobId> = self
            .leases
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.leases.remove(&id);
            tracing::warn!(job_id = %id, "lease expired, job visible again");
            self.ready.push_back(id);
        }
        for deadline in self.leases.values() {
            next = Some(next.map_or(*deadline, |n| n.min(*deadline)));
        }
        next
    }

    fn unschedule(&mut self, job_id: &JobId) {
        self.ready.retain(|id| id != job_id);
        self.delayed.retain(|(_, id)| id != job_id);
        self.leases.remove(job_id);
    }
}

pub struct InMemoryJobQueue {
    state: Mutex<State>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl InMemoryJobQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, QueueError> {
        self.state
            .lock()
            .map_err(|_| QueueError::backend("queue state poisoned"))
    }

    /// Number of jobs not yet acked, leased ones included.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobQueuePort for InMemoryJobQueue {
    async fn enqueue(&self, job: ConversionJob) -> Result<Enqueued, QueueError> {
        {
            let mut state = self.lock()?;
            if let Some(existing) = state.active.get(&job.video_id) {
                return Ok(Enqueued::Coalesced(existing.clone()));
            }
            let id = job.id.clone();
            state.active.insert(job.video_id.clone(), id.clone());
            state.ready.push_back(id.clone());
            state.jobs.insert(id, job.clone());
        }
        self.notify.notify_one();
        Ok(Enqueued::Accepted(job.id))
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<ConversionJob>, QueueError> {
        let give_up = Instant::now() + timeout;
        loop {
            let wake = {
                let mut state = self.lock()?;
                let now = Instant::now();
                let next_due = state.promote(now);
                while let Some(id) = state.ready.pop_front() {
                    let leased = match state.jobs.get_mut(&id) {
                        Some(job) => {
                            job.attempts += 1;
                            job.clone()
                        }
                        None => continue,
                    };
                    state.leases.insert(id, now + self.visibility_timeout);
                    return Ok(Some(leased));
                }
                match next_due {
                    Some(due) => due.min(give_up),
                    None => give_up,
                }
            };

            if Instant::now() >= give_up {
                return Ok(None);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    async fn ack(&self, job_id: &JobId) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        state.unschedule(job_id);
        if let Some(job) = state.jobs.remove(job_id) {
            if state.active.get(&job.video_id) == Some(job_id) {
                state.active.remove(&job.video_id);
            }
        }
        Ok(())
    }

    async fn requeue(&self, job: ConversionJob, delay: Duration) -> Result<(), QueueError> {
        {
            let mut state = self.lock()?;
            if !state.jobs.contains_key(&job.id) {
                return Err(QueueError::UnknownLease(job.id));
            }
            state.unschedule(&job.id);
            let id = job.id.clone();
            if delay.is_zero() {
                state.ready.push_back(id.clone());
            } else {
                state.delayed.push((Instant::now() + delay, id.clone()));
            }
            state.jobs.insert(id, job);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn extend_lease(&self, job_id: &JobId) -> Result<(), QueueError> {
        let mut state = self.lock()?;
        match state.leases.get_mut(job_id) {
            Some(deadline) => {
                *deadline = Instant::now() + self.visibility_timeout;
                Ok(())
            }
            None => Err(QueueError::UnknownLease(job_id.clone())),
        }
    }

    async fn cancel(&self, video_id: &VideoId) -> Result<bool, QueueError> {
        let mut state = self.lock()?;
        let Some(job_id) = state.active.get(video_id).cloned() else {
            return Ok(false);
        };
        if state.leases.contains_key(&job_id) {
            return Ok(false);
        }
        state.unschedule(&job_id);
        state.jobs.remove(&job_id);
        state.active.remove(video_id);
        Ok(true)
    }
}
