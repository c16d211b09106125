use super::StatusEvent;
use crate::domain::status::VideoState;
use crate::domain::video::VideoId;
use crate::ports::notify::StatusNotifier;
use chrono::Utc;
use tokio::sync::broadcast;

const CAPACITY: usize = 256;

/// Fan-out of status events to any number of in-process subscribers.
#[derive(Debug)]
pub struct EventHub {
    sender: broadcast::Sender<StatusEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CAPACITY);
        Self { sender }
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: StatusEvent) -> usize {
        // No subscriber is not an error for a notification.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusNotifier for EventHub {
    fn notify_status_changed(&self, video_id: &VideoId, state: VideoState) {
        self.publish(StatusEvent {
            video_id: video_id.clone(),
            state,
            at: Utc::now(),
        });
    }
}
