//! Domain layer - Pure business logic.

// Content addressing of manifests and segments
pub mod addressing;

// ffmpeg invocation and output verification
pub mod encoder;

// HLS playlists
pub mod hls;

pub mod jobs;
pub mod ladder;
pub mod status;
pub mod video;
