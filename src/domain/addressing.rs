//! Content addressing: canonical storage paths and URLs for rendition artifacts.
//!
//! Layout relative to the content root:
//! - `{video_id}/{resolution}/index.m3u8`
//! - `{video_id}/{resolution}/segment_{index:03}.ts`

use super::video::VideoId;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

pub const MANIFEST_NAME: &str = "index.m3u8";
pub const MASTER_MANIFEST_NAME: &str = "master.m3u8";

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^segment_(\d{3,})\.ts$").expect("valid segment pattern"))
}

pub fn video_dir(video_id: &VideoId) -> PathBuf {
    PathBuf::from(video_id.as_str())
}

pub fn rendition_dir(video_id: &VideoId, resolution: &str) -> PathBuf {
    video_dir(video_id).join(resolution)
}

pub fn manifest_path(video_id: &VideoId, resolution: &str) -> PathBuf {
    rendition_dir(video_id, resolution).join(MANIFEST_NAME)
}

pub fn segment_name(index: u32) -> String {
    format!("segment_{:03}.ts", index)
}

pub fn segment_path(video_id: &VideoId, resolution: &str, index: u32) -> PathBuf {
    rendition_dir(video_id, resolution).join(segment_name(index))
}

/// Parse a segment file name back into its index.
///
/// Only the canonical spelling is accepted, so `segment_0001.ts` is rejected
/// because index 1 is always written as `segment_001.ts`.
pub fn parse_segment_name(name: &str) -> Option<u32> {
    let caps = segment_pattern().captures(name)?;
    let index: u32 = caps.get(1)?.as_str().parse().ok()?;
    (segment_name(index) == name).then_some(index)
}

pub fn manifest_url(video_id: &VideoId, resolution: &str) -> String {
    format!("/video/{}/{}/{}", video_id, resolution, MANIFEST_NAME)
}

pub fn segment_url(video_id: &VideoId, resolution: &str, index: u32) -> String {
    format!("/video/{}/{}/{}", video_id, resolution, segment_name(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> VideoId {
        VideoId::parse(raw).unwrap()
    }

    #[test]
    fn test_paths_have_canonical_shape() {
        let v = id("v1");
        assert_eq!(manifest_path(&v, "720p"), PathBuf::from("v1/720p/index.m3u8"));
        assert_eq!(segment_path(&v, "720p", 0), PathBuf::from("v1/720p/segment_000.ts"));
        assert_eq!(segment_path(&v, "480p", 42), PathBuf::from("v1/480p/segment_042.ts"));
        assert_eq!(segment_name(1234), "segment_1234.ts");
    }

    #[test]
    fn test_urls() {
        let v = id("9");
        assert_eq!(manifest_url(&v, "1080p"), "/video/9/1080p/index.m3u8");
        assert_eq!(segment_url(&v, "1080p", 7), "/video/9/1080p/segment_007.ts");
    }

    #[test]
    fn test_parse_segment_name() {
        assert_eq!(parse_segment_name("segment_000.ts"), Some(0));
        assert_eq!(parse_segment_name("segment_017.ts"), Some(17));
        assert_eq!(parse_segment_name("segment_1000.ts"), Some(1000));
        assert_eq!(parse_segment_name("segment_0001.ts"), None);
        assert_eq!(parse_segment_name("segment_01.ts"), None);
        assert_eq!(parse_segment_name("segment_001.mp4"), None);
        assert_eq!(parse_segment_name("../segment_001.ts"), None);
        assert_eq!(parse_segment_name("index.m3u8"), None);
    }
}
