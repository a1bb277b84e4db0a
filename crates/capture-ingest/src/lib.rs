pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod pipeline;
pub mod resolve;
pub mod sanitize;
pub mod scheduler;
pub mod storage;
pub mod thumbnail;

use std::sync::Arc;

pub use config::{load_config, Config};
pub use error::{
    ConfigError, ExtractionError, IngestError, ResolveError, Result, SchedulerError, StorageError,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext};
pub use scheduler::{Job, JobPayload, JobScheduler, JobStatus, SchedulerOptions, UploadMeta};
pub use storage::{RecordingAssets, RecordingStore};

/// A scheduler wired to the production pipeline, sharing one recording
/// store with its readers.
pub struct IngestService {
    pub scheduler: JobScheduler,
    pub store: Arc<RecordingStore>,
}

impl IngestService {
    /// Opens the queue and store under the configured data directory. The
    /// scheduler is not started.
    pub fn open(config: &Config) -> Result<Self> {
        let store = Arc::new(RecordingStore::new(config.recordings_directory()?));
        let pipeline_config = Arc::new(PipelineConfig::from_config(config)?);
        let pipeline = Pipeline::from_config(pipeline_config, Arc::clone(&store));

        let scheduler =
            JobScheduler::open(SchedulerOptions::from_config(config)?, Arc::new(pipeline))?;

        Ok(Self { scheduler, store })
    }
}
