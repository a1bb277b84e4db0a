use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::scheduler::RetryPolicy;

const APP_DIR_NAME: &str = "capture-ingest";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    /// Root for the job queue, stored recordings and scratch space.
    /// Defaults to the platform's local data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_directory: Option<PathBuf>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_history_limit() -> usize {
    100
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            data_directory: None,
            history_limit: default_history_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            retry: RetryConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Config rooted at an explicit data directory, everything else default.
    pub fn with_data_directory<P: Into<PathBuf>>(data_directory: P) -> Self {
        Self {
            data_directory: Some(data_directory.into()),
            ..Self::default()
        }
    }

    pub fn data_directory(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_directory {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_local_dir()
                .map(|d| d.join(APP_DIR_NAME))
                .ok_or(ConfigError::NoDataDirectory),
        }
    }

    pub fn queue_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_directory()?.join("queue").join("jobs.json"))
    }

    pub fn recordings_directory(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_directory()?.join("recordings"))
    }

    pub fn work_directory(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_directory()?.join("work"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetryKind {
    #[default]
    None,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default)]
    pub policy: RetryKind,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_secs() -> u64 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: RetryKind::None,
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        match self.policy {
            RetryKind::None => RetryPolicy::None,
            RetryKind::Exponential => RetryPolicy::exponential(
                self.max_attempts,
                Duration::from_secs(self.base_delay_secs),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThumbnailConfig {
    /// One thumbnail per this many seconds of footage.
    #[serde(default = "default_seconds_per_thumbnail")]
    pub seconds_per_thumbnail: f64,
    #[serde(default = "default_max_count")]
    pub max_count: usize,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_seconds_per_thumbnail() -> f64 {
    5.0
}

fn default_max_count() -> usize {
    12
}

fn default_max_width() -> u32 {
    320
}

fn default_max_height() -> u32 {
    200
}

fn default_jpeg_quality() -> u8 {
    80
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            seconds_per_thumbnail: default_seconds_per_thumbnail(),
            max_count: default_max_count(),
            max_width: default_max_width(),
            max_height: default_max_height(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Program names (or absolute paths) of the external tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    #[serde(default = "default_unzip")]
    pub unzip: String,
    #[serde(default = "default_tar")]
    pub tar: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_unzip() -> String {
    "unzip".to_string()
}

fn default_tar() -> String {
    "tar".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            unzip: default_unzip(),
            tar: default_tar(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let config = Config::with_data_directory("/srv/ingest");
        assert_eq!(
            config.queue_file().unwrap(),
            PathBuf::from("/srv/ingest/queue/jobs.json")
        );
        assert_eq!(
            config.recordings_directory().unwrap(),
            PathBuf::from("/srv/ingest/recordings")
        );
        assert_eq!(
            config.work_directory().unwrap(),
            PathBuf::from("/srv/ingest/work")
        );
    }

    #[test]
    fn test_retry_config_to_policy() {
        assert_eq!(RetryConfig::default().to_policy(), RetryPolicy::None);

        let retry = RetryConfig {
            policy: RetryKind::Exponential,
            max_attempts: 3,
            base_delay_secs: 5,
        };
        assert_eq!(
            retry.to_policy(),
            RetryPolicy::exponential(3, Duration::from_secs(5))
        );
    }

    #[test]
    fn test_thumbnail_defaults() {
        let thumbs = ThumbnailConfig::default();
        assert_eq!(thumbs.seconds_per_thumbnail, 5.0);
        assert_eq!(thumbs.max_count, 12);
        assert_eq!((thumbs.max_width, thumbs.max_height), (320, 200));
    }
}
