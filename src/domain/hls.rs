use super::addressing::{parse_segment_name, segment_name, MANIFEST_NAME};
use super::ladder::LadderEntry;
use std::path::Path;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Audio bitrate added to every rendition, in kbit/s.
pub const AUDIO_BITRATE_KBPS: u32 = 128;

#[derive(Debug, Error, PartialEq)]
pub enum ManifestError {
    #[error("playlist does not start with #EXTM3U")]
    MissingHeader,
    #[error("line {line}: invalid #EXTINF duration")]
    InvalidDuration { line: usize },
    #[error("line {line}: segment uri {uri:?} is not a canonical segment name")]
    InvalidSegmentUri { line: usize, uri: String },
    #[error("line {line}: segment uri without #EXTINF")]
    UriWithoutDuration { line: usize },
    #[error("segment {index} listed out of order")]
    OutOfOrder { index: u32 },
    #[error("playlist lists no segments")]
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRef {
    pub index: u32,
    pub duration: f64,
}

impl SegmentRef {
    pub fn uri(&self) -> String {
        segment_name(self.index)
    }
}

/// A VOD media playlist listing one rendition's segments in playback order.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub version: u8,
    pub target_duration: u64,
    pub media_sequence: u64,
    pub segments: Vec<SegmentRef>,
    pub end_list: bool,
    pub playlist_type: Option<String>,
    pub independent_segments: bool,
}

impl Manifest {
    pub fn new(target_duration: u64) -> Self {
        Self {
            version: 3,
            target_duration,
            media_sequence: 0,
            segments: Vec::new(),
            end_list: true,
            playlist_type: None,
            independent_segments: false,
        }
    }

    /// Build a complete VOD playlist; the target duration is the longest
    /// segment rounded up.
    pub fn vod(segments: Vec<SegmentRef>) -> Self {
        let max = segments.iter().map(|s| s.duration).fold(0.0_f64, f64::max);
        let mut manifest = Self::new(max.ceil() as u64);
        manifest.playlist_type = Some("VOD".to_string());
        manifest.independent_segments = true;
        manifest.segments = segments;
        manifest
    }

    pub fn add_segment(&mut self, index: u32, duration: f64) {
        self.segments.push(SegmentRef { index, duration });
    }

    pub fn contains(&self, index: u32) -> bool {
        self.segments.iter().any(|s| s.index == index)
    }

    pub fn total_duration(&self) -> f64 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        out.push_str(&format!("#EXT-X-VERSION:{}\n", self.version));
        out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", self.target_duration));
        out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", self.media_sequence));

        if let Some(pt) = &self.playlist_type {
            out.push_str(&format!("#EXT-X-PLAYLIST-TYPE:{}\n", pt));
        }

        if self.independent_segments {
            out.push_str("#EXT-X-INDEPENDENT-SEGMENTS\n");
        }

        for segment in &self.segments {
            out.push_str(&format!("#EXTINF:{:.6},\n", segment.duration));
            out.push_str(&segment.uri());
            out.push('\n');
        }

        if self.end_list {
            out.push_str("#EXT-X-ENDLIST\n");
        }

        out
    }

    pub async fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let mut file = File::create(path).await?;
        file.write_all(self.render().as_bytes()).await?;
        file.sync_all().await
    }

    /// Parse a media playlist as written by the encoder. Segment uris may carry
    /// a directory prefix; only the file name is kept and it must be canonical.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut lines = text.lines().enumerate();
        match lines.next() {
            Some((_, first)) if first.trim() == "#EXTM3U" => {}
            _ => return Err(ManifestError::MissingHeader),
        }

        let mut manifest = Manifest::new(0);
        let mut pending_duration: Option<f64> = None;

        for (n, raw) in lines {
            let line_no = n + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix("#EXTINF:") {
                let value = rest.split(',').next().unwrap_or("").trim();
                let duration: f64 = value
                    .parse()
                    .map_err(|_| ManifestError::InvalidDuration { line: line_no })?;
                if !duration.is_finite() || duration < 0.0 {
                    return Err(ManifestError::InvalidDuration { line: line_no });
                }
                pending_duration = Some(duration);
            } else if let Some(v) = line.strip_prefix("#EXT-X-VERSION:") {
                manifest.version = v.trim().parse().unwrap_or(manifest.version);
            } else if let Some(v) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                manifest.target_duration = v.trim().parse().unwrap_or(0);
            } else if let Some(v) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                manifest.media_sequence = v.trim().parse().unwrap_or(0);
            } else if let Some(v) = line.strip_prefix("#EXT-X-PLAYLIST-TYPE:") {
                manifest.playlist_type = Some(v.trim().to_string());
            } else if line == "#EXT-X-INDEPENDENT-SEGMENTS" {
                manifest.independent_segments = true;
            } else if line.starts_with('#') {
                continue;
            } else {
                let duration = pending_duration
                    .take()
                    .ok_or(ManifestError::UriWithoutDuration { line: line_no })?;
                let file_name = line.rsplit('/').next().unwrap_or(line);
                let index =
                    parse_segment_name(file_name).ok_or_else(|| ManifestError::InvalidSegmentUri {
                        line: line_no,
                        uri: line.to_string(),
                    })?;
                if manifest.segments.last().is_some_and(|last| last.index >= index) {
                    return Err(ManifestError::OutOfOrder { index });
                }
                manifest.add_segment(index, duration);
            }
        }

        if manifest.segments.is_empty() {
            return Err(ManifestError::Empty);
        }

        manifest.end_list = text.contains("#EXT-X-ENDLIST");
        Ok(manifest)
    }
}

/// Master playlist over the given renditions, each addressed relative to the
/// master as `{name}/index.m3u8`.
pub fn render_master<'a>(renditions: impl IntoIterator<Item = &'a LadderEntry>) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-INDEPENDENT-SEGMENTS\n");
    for entry in renditions {
        let bandwidth = u64::from(entry.bitrate + AUDIO_BITRATE_KBPS) * 1000;
        out.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{},NAME=\"{}\"\n",
            bandwidth, entry.width, entry.height, entry.name
        ));
        out.push_str(&format!("{}/{}\n", entry.name, MANIFEST_NAME));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::fs;

    #[tokio::test]
    async fn test_playlist_metadata() {
        let manifest = Manifest::vod(vec![
            SegmentRef { index: 0, duration: 10.0 },
            SegmentRef { index: 1, duration: 9.5 },
        ]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.m3u8");
        manifest.write_to(&path).await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();

        assert!(content.starts_with("#EXTM3U\n"));
        assert!(content.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
        assert!(content.contains("#EXT-X-INDEPENDENT-SEGMENTS"));
        assert!(content.contains("#EXT-X-TARGETDURATION:10"));
        assert!(content.contains("#EXTINF:9.500000,\nsegment_001.ts\n"));
        assert!(content.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn test_parse_encoder_output() {
        let text = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n\
                    #EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-PLAYLIST-TYPE:VOD\n\
                    #EXTINF:10.010000,\n/tmp/stage/segment_000.ts\n\
                    #EXTINF:4.2,\nsegment_001.ts\n#EXT-X-ENDLIST\n";

        let manifest = Manifest::parse(text).unwrap();
        assert_eq!(manifest.segments.len(), 2);
        assert_eq!(manifest.segments[0].index, 0);
        assert_eq!(manifest.segments[1].duration, 4.2);
        assert!(manifest.end_list);
        assert!(manifest.contains(1));
        assert!(!manifest.contains(2));
    }

    #[test]
    fn test_render_parse_is_stable() {
        let manifest = Manifest::vod(vec![
            SegmentRef { index: 0, duration: 10.0 },
            SegmentRef { index: 1, duration: 10.0 },
            SegmentRef { index: 2, duration: 3.25 },
        ]);
        let rendered = manifest.render();
        assert_eq!(Manifest::parse(&rendered).unwrap().render(), rendered);
    }

    #[test]
    fn test_parse_rejects_bad_playlists() {
        assert_eq!(Manifest::parse("segment_000.ts"), Err(ManifestError::MissingHeader));
        assert_eq!(
            Manifest::parse("#EXTM3U\n#EXT-X-ENDLIST\n"),
            Err(ManifestError::Empty)
        );
        assert!(matches!(
            Manifest::parse("#EXTM3U\n#EXTINF:1.0,\nevil/../../x.ts\n"),
            Err(ManifestError::InvalidSegmentUri { .. })
        ));
        assert!(matches!(
            Manifest::parse("#EXTM3U\nsegment_000.ts\n"),
            Err(ManifestError::UriWithoutDuration { .. })
        ));
        assert!(matches!(
            Manifest::parse("#EXTM3U\n#EXTINF:1,\nsegment_001.ts\n#EXTINF:1,\nsegment_000.ts\n"),
            Err(ManifestError::OutOfOrder { index: 0 })
        ));
    }

    #[test]
    fn test_render_master() {
        let entries = [
            LadderEntry::new("480p", 854, 480, 1400),
            LadderEntry::new("720p", 1280, 720, 2800),
        ];
        let master = render_master(&entries);
        assert!(master.contains("BANDWIDTH=1528000,RESOLUTION=854x480"));
        assert!(master.contains("720p/index.m3u8\n"));
    }
}
