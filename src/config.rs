//! Configuration for the monolith deployment.

use crate::domain::jobs::RetryPolicy;
use crate::domain::ladder::{LadderError, ResolutionLadder};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("invalid resolution ladder: {0}")]
    Ladder(#[from] LadderError),
}

#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: u16,
    /// Root of sources, thumbnails, staging and published renditions
    pub media_root: PathBuf,
    /// Redis connection URL; in-memory adapters when unset
    pub redis_url: Option<String>,
    pub workers: usize,
    pub ffmpeg_bin: String,
    pub encode_timeout: Duration,
    pub visibility_timeout: Duration,
    pub retry: RetryPolicy,
    pub ladder: ResolutionLadder,
    /// Bearer tokens accepted on the streaming routes
    pub api_tokens: Vec<String>,
    /// Bearer tokens accepted on the operator routes
    pub admin_tokens: Vec<String>,
}

impl Config {
    /// Load configuration from `.env` and environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let ladder = match get("LADDER_FILE") {
            Some(path) => ResolutionLadder::from_json_file(Path::new(&path))?,
            None => ResolutionLadder::default(),
        };

        let retry = RetryPolicy {
            max_attempts: parse_or(&get, "MAX_ATTEMPTS", 3)?,
            backoff: match get("RETRY_BACKOFF_SECS") {
                Some(raw) => parse_list::<u64>("RETRY_BACKOFF_SECS", &raw)?
                    .into_iter()
                    .map(Duration::from_secs)
                    .collect(),
                None => RetryPolicy::default().backoff,
            },
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_ATTEMPTS",
                value: "0".into(),
            });
        }

        let workers: usize = parse_or(&get, "WORKERS", 4)?;
        if workers == 0 {
            return Err(ConfigError::Invalid {
                name: "WORKERS",
                value: "0".into(),
            });
        }

        Ok(Self {
            addr: get("ADDR").unwrap_or_else(|| String::from("127.0.0.1")),
            port: parse_or(&get, "PORT", 3000)?,
            media_root: PathBuf::from(get("MEDIA_ROOT").unwrap_or_else(|| String::from("./media"))),
            redis_url: get("REDIS_URL"),
            workers,
            ffmpeg_bin: get("FFMPEG_BIN").unwrap_or_else(|| String::from("ffmpeg")),
            encode_timeout: parse_secs(&get, "ENCODE_TIMEOUT_SECS", 3600)?,
            visibility_timeout: parse_secs(&get, "VISIBILITY_TIMEOUT_SECS", 300)?,
            retry,
            ladder,
            api_tokens: get("API_TOKENS").map(|raw| split_list(&raw)).unwrap_or_default(),
            admin_tokens: get("ADMIN_TOKENS").map(|raw| split_list(&raw)).unwrap_or_default(),
        })
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.media_root.join("sources")
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.media_root.join("thumbnails")
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_list<T: FromStr>(name: &'static str, raw: &str) -> Result<Vec<T>, ConfigError> {
    split_list(raw)
        .iter()
        .map(|item| {
            item.parse().map_err(|_| ConfigError::Invalid {
                name,
                value: raw.to_string(),
            })
        })
        .collect()
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

/// A timeout in whole seconds. Zero would expire leases as soon as they
/// are handed out, so it is rejected.
fn parse_secs<G>(get: &G, name: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match parse_or(get, name, default)? {
        0 => Err(ConfigError::Invalid {
            name,
            value: "0".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}
