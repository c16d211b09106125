use crate::domain::status::VideoState;
use crate::domain::video::VideoId;

/// Receives the aggregate state of a video after each rendition transition.
/// Implementations must not block the caller.
pub trait StatusNotifier: Send + Sync {
    fn notify_status_changed(&self, video_id: &VideoId, state: VideoState);
}
