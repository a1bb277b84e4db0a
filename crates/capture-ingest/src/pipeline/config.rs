use std::path::PathBuf;

use crate::config::{Config, ThumbnailConfig, ToolsConfig};
use crate::error::ConfigError;

pub struct PipelineConfig {
    /// Scratch space; each job extracts into its own subdirectory.
    pub work_directory: PathBuf,
    pub thumbnails: ThumbnailConfig,
    pub tools: ToolsConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            work_directory: config.work_directory()?,
            thumbnails: config.thumbnails.clone(),
            tools: config.tools.clone(),
        })
    }
}
