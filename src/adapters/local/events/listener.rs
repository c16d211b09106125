use super::hub::EventHub;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Log every status change until the hub is dropped.
pub fn start(event_hub: Arc<EventHub>) -> JoinHandle<()> {
    let mut rx = event_hub.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    tracing::info!(
                        video_id = %event.video_id,
                        state = %event.state,
                        "video status changed"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "status listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
