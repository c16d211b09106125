//! Key layout. Every key lives under one namespace so that several
//! deployments (or test runs) can share a Redis database.

use crate::domain::jobs::JobId;
use crate::domain::video::VideoId;

pub const DEFAULT_NAMESPACE: &str = "crooner";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    namespace: String,
}

impl Keys {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Ids of jobs that can be handed out now.
    pub fn ready(&self) -> String {
        format!("{}:jobs:ready", self.namespace)
    }

    /// Ids of requeued jobs, scored by the millisecond they become due.
    pub fn delayed(&self) -> String {
        format!("{}:jobs:delayed", self.namespace)
    }

    /// Ids of handed out jobs, scored by their lease deadline.
    pub fn leases(&self) -> String {
        format!("{}:jobs:leases", self.namespace)
    }

    pub fn job_prefix(&self) -> String {
        format!("{}:job:", self.namespace)
    }

    pub fn job(&self, id: &JobId) -> String {
        format!("{}{}", self.job_prefix(), id)
    }

    pub fn active_prefix(&self) -> String {
        format!("{}:active:", self.namespace)
    }

    /// Id of the job currently owning the video.
    pub fn active(&self, video_id: &VideoId) -> String {
        format!("{}{}", self.active_prefix(), video_id)
    }

    pub fn status(&self, video_id: &VideoId) -> String {
        format!("{}:status:{}", self.namespace, video_id)
    }

    pub fn video_sequence(&self) -> String {
        format!("{}:videos:seq", self.namespace)
    }

    pub fn video_index(&self) -> String {
        format!("{}:videos:index", self.namespace)
    }

    pub fn video(&self, id: &str) -> String {
        format!("{}:video:{}", self.namespace, id)
    }
}

impl Default for Keys {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}
