use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Could not determine a data directory; set data_directory explicitly")]
    NoDataDirectory,
}

/// A single failed attempt inside the extraction fallback chain.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("'{0}' is not installed")]
    ToolMissing(String),

    #[error("'{tool}' exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{0}")]
    Archive(String),

    #[error("not applicable: {0}")]
    NotApplicable(String),

    #[error("produced no files")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub error: StrategyError,
}

impl std::fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.strategy, self.error)
    }
}

fn join_failures(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to prepare extraction directory '{path}': {source}")]
    PrepareTarget {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("All extraction strategies failed for '{file}': {}", join_failures(.attempts))]
    AllStrategiesFailed {
        file: String,
        attempts: Vec<StrategyFailure>,
    },
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No video file found in '{directory}' (looked for {})", .searched.join(", "))]
    VideoNotFound {
        directory: PathBuf,
        searched: Vec<String>,
    },
}

/// Problems with an uploaded event log. Never fails a job; the log degrades
/// to an empty one.
#[derive(Error, Debug)]
pub enum EventsParseError {
    #[error("Failed to read events file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Events file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Events file has no 'events' list")]
    MissingEvents,
}

/// Thumbnailing failures. Absorbed by the sampler.
#[derive(Error, Debug)]
pub enum PackageMetadataError {
    #[error("Failed to read package metadata '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Package metadata is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("'{0}' is not installed")]
    ToolMissing(String),

    #[error("Failed to run '{tool}': {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Duration probe failed: {0}")]
    ProbeFailed(String),

    #[error("Video has no usable duration ({0})")]
    InvalidDuration(f64),

    #[error("Frame extraction at {timestamp:.3}s failed: {message}")]
    FrameFailed { timestamp: f64, message: String },

    #[error("Failed to encode thumbnail: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy file from '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read metadata '{path}': {source}")]
    ReadMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt metadata '{path}': {source}")]
    CorruptMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to commit recording '{recording_id}': {source}")]
    Commit {
        recording_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Recording already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid recording id: {0:?}")]
    InvalidId(String),
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Failed to persist job queue to '{path}': {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read job queue '{path}': {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize job queue: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Scheduler is shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, IngestError>;
