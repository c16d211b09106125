use crate::domain::status::VideoState;
use crate::domain::video::VideoId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod hub;
pub mod listener;

/// Aggregate state of a video after one of its renditions changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub video_id: VideoId,
    pub state: VideoState,
    pub at: DateTime<Utc>,
}
