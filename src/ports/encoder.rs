use crate::domain::hls::Manifest;
use crate::domain::ladder::LadderEntry;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Diagnostics captured from a failed encoder run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingFailure {
    pub resolution: String,
    /// `None` when the process was killed or never started.
    pub exit_code: Option<i32>,
    pub captured_stderr: String,
}

impl fmt::Display for EncodingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "encoding {} failed with exit code {}", self.resolution, code)?,
            None => write!(f, "encoding {} failed without exit code", self.resolution)?,
        }
        if let Some(last) = self.captured_stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            write!(f, ": {}", last.trim())?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("source file missing: {}", .0.display())]
    MissingSourceFile(PathBuf),
    #[error("{0}")]
    Failed(EncodingFailure),
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl EncodeError {
    /// Terminal errors cannot be fixed by running the encoder again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EncodeError::MissingSourceFile(_))
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        EncodeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
pub trait Encoder: Send + Sync {
    /// Encode `source` into `output_dir` as segments plus `index.m3u8`, the
    /// manifest being written last. Repeated calls overwrite deterministically.
    async fn encode(
        &self,
        source: &Path,
        entry: &LadderEntry,
        output_dir: &Path,
    ) -> Result<Manifest, EncodeError>;
}
