//! Resolution ladder: the ordered set of renditions produced for every video.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,32}$").expect("valid ladder name pattern"))
}

#[derive(Debug, Error)]
pub enum LadderError {
    #[error("resolution ladder is empty")]
    Empty,
    #[error("invalid rendition name {0:?}")]
    InvalidName(String),
    #[error("duplicate rendition name {0:?}")]
    Duplicate(String),
    #[error("rendition {0:?} has zero dimensions or bitrate")]
    ZeroValue(String),
    #[error("failed to read ladder file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse ladder file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One target rendition. `bitrate` is the video bitrate in kbit/s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderEntry {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
}

impl LadderEntry {
    pub fn new(name: &str, width: u32, height: u32, bitrate: u32) -> Self {
        Self {
            name: name.to_owned(),
            width,
            height,
            bitrate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionLadder {
    entries: Vec<LadderEntry>,
}

impl ResolutionLadder {
    pub fn new(entries: Vec<LadderEntry>) -> Result<Self, LadderError> {
        if entries.is_empty() {
            return Err(LadderError::Empty);
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            if !name_pattern().is_match(&entry.name) {
                return Err(LadderError::InvalidName(entry.name.clone()));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(LadderError::Duplicate(entry.name.clone()));
            }
            if entry.width == 0 || entry.height == 0 || entry.bitrate == 0 {
                return Err(LadderError::ZeroValue(entry.name.clone()));
            }
        }

        Ok(Self { entries })
    }

    /// Load a ladder from a JSON array of `{name, width, height, bitrate}`.
    pub fn from_json_file(path: &Path) -> Result<Self, LadderError> {
        let raw = std::fs::read_to_string(path)?;
        Self::new(serde_json::from_str(&raw)?)
    }

    pub fn entries(&self) -> &[LadderEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&LadderEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

impl Default for ResolutionLadder {
    fn default() -> Self {
        Self {
            entries: vec![
                LadderEntry::new("480p", 854, 480, 1400),
                LadderEntry::new("720p", 1280, 720, 2800),
                LadderEntry::new("1080p", 1920, 1080, 5000),
            ],
        }
    }
}
