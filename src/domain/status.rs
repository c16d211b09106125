//! Per-rendition pipeline state and the overall video state derived from it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RenditionStatus {
    Pending,
    Encoding,
    Ready,
    Failed { reason: String },
}

impl RenditionStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        RenditionStatus::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, RenditionStatus::Ready)
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, RenditionStatus::Pending | RenditionStatus::Encoding)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RenditionStatus::Pending => "pending",
            RenditionStatus::Encoding => "encoding",
            RenditionStatus::Ready => "ready",
            RenditionStatus::Failed { .. } => "failed",
        }
    }

    /// Ready is final: a rendition never leaves it. Failed may only go back
    /// to Pending, which happens when an operator re-creates the job.
    pub fn can_transition_to(&self, next: &RenditionStatus) -> bool {
        use RenditionStatus::*;
        match (self, next) {
            (Ready, _) => false,
            (Failed { .. }, Pending) => true,
            (Failed { .. }, _) => false,
            (Pending, _) => true,
            (Encoding, _) => true,
        }
    }
}

impl fmt::Display for RenditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenditionStatus::Failed { reason } => write!(f, "failed: {}", reason),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoState {
    Processing,
    Ready,
    Failed,
}

impl VideoState {
    /// Ready when every rendition is Ready; Failed once nothing is left in
    /// progress and at least one rendition failed; Processing otherwise.
    pub fn aggregate<'a>(renditions: impl IntoIterator<Item = &'a RenditionStatus>) -> Self {
        let mut any = false;
        let mut all_ready = true;
        let mut in_progress = false;
        let mut failed = false;

        for status in renditions {
            any = true;
            all_ready &= status.is_ready();
            in_progress |= status.is_in_progress();
            failed |= matches!(status, RenditionStatus::Failed { .. });
        }

        if any && all_ready {
            VideoState::Ready
        } else if failed && !in_progress {
            VideoState::Failed
        } else {
            VideoState::Processing
        }
    }
}

impl fmt::Display for VideoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VideoState::Processing => "processing",
            VideoState::Ready => "ready",
            VideoState::Failed => "failed",
        })
    }
}

/// Snapshot of every rendition of one video, keyed by rendition name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStatus {
    pub renditions: BTreeMap<String, RenditionStatus>,
}

impl VideoStatus {
    pub fn state(&self) -> VideoState {
        VideoState::aggregate(self.renditions.values())
    }

    pub fn rendition(&self, name: &str) -> Option<&RenditionStatus> {
        self.renditions.get(name)
    }
}
