use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Source container extensions accepted for ingestion.
pub const ALLOWED_SOURCE_EXTENSIONS: &[&str] = &["avi", "flv", "mkv", "mov", "mp4", "wmv"];

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid id pattern"))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VideoError {
    #[error("invalid video id: {0:?}")]
    InvalidId(String),
    #[error("unknown category: {0:?}")]
    UnknownCategory(String),
    #[error("unsupported file extension, allowed: {}", ALLOWED_SOURCE_EXTENSIONS.join(", "))]
    UnsupportedExtension,
}

/// Stable identifier of a video. Always safe to use as a path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    pub fn parse(raw: &str) -> Result<Self, VideoError> {
        if id_pattern().is_match(raw) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(VideoError::InvalidId(raw.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VideoId {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VideoId {
    type Error = VideoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[default]
    Drama,
    Romance,
    Action,
    Documentary,
    Tutorial,
    Vlog,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Drama,
        Category::Romance,
        Category::Action,
        Category::Documentary,
        Category::Tutorial,
        Category::Vlog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Drama => "Drama",
            Category::Romance => "Romance",
            Category::Action => "Action",
            Category::Documentary => "Documentary",
            Category::Tutorial => "Tutorial",
            Category::Vlog => "Vlog",
        }
    }
}

impl FromStr for Category {
    type Err = VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| VideoError::UnknownCategory(s.to_owned()))
    }
}

/// A registered video. Rendition state lives in the status tracker, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub source_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the operator when registering a video.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub source_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
}

impl NewVideo {
    pub fn into_video(self, id: VideoId, created_at: DateTime<Utc>) -> Video {
        Video {
            id,
            title: self.title,
            description: self.description,
            category: self.category,
            source_path: self.source_path,
            thumbnail_path: self.thumbnail_path,
            created_at,
        }
    }
}

pub fn validate_source_extension(path: &Path) -> Result<(), VideoError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or(VideoError::UnsupportedExtension)?;

    if ALLOWED_SOURCE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(VideoError::UnsupportedExtension)
    }
}

/// Build a collision-free storage name for an uploaded source file:
/// `{uuid}_{slug}{.ext}` with the extension lowercased.
pub fn source_file_name(original: &str) -> String {
    let path = Path::new(original);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    let mut slug = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "video" } else { slug };

    format!("{}_{}{}", uuid::Uuid::new_v4().simple(), slug, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_rejects_path_traversal() {
        assert!(VideoId::parse("42").is_ok());
        assert!(VideoId::parse("v1-alpha_2").is_ok());
        assert!(VideoId::parse("..").is_err());
        assert!(VideoId::parse("a/b").is_err());
        assert!(VideoId::parse("").is_err());
    }

    #[test]
    fn test_video_id_serde_validates() {
        let id: VideoId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(id.as_str(), "7");
        assert!(serde_json::from_str::<VideoId>("\"../etc\"").is_err());
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("vlog".parse::<Category>().unwrap(), Category::Vlog);
        assert_eq!(" Drama ".parse::<Category>().unwrap(), Category::Drama);
        assert!("Horror".parse::<Category>().is_err());
    }

    #[test]
    fn test_validate_source_extension() {
        assert!(validate_source_extension(Path::new("movie.MP4")).is_ok());
        assert!(validate_source_extension(Path::new("clip.mkv")).is_ok());
        assert_eq!(
            validate_source_extension(Path::new("notes.txt")),
            Err(VideoError::UnsupportedExtension)
        );
        assert!(validate_source_extension(Path::new("noext")).is_err());
    }

    #[test]
    fn test_source_file_name_slugifies() {
        let name = source_file_name("My Holiday -- Clip.MOV");
        let (prefix, rest) = name.split_once('_').unwrap();
        assert_eq!(prefix.len(), 32);
        assert_eq!(rest, "my-holiday-clip.mov");

        let fallback = source_file_name("???.mp4");
        assert!(fallback.ends_with("_video.mp4"));
    }
}
