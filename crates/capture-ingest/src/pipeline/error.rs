use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::error::{ExtractionError, ResolveError, StorageError};
use crate::scheduler::JobFailure;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to prepare workspace '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    Resolve(#[from] ResolveError),

    #[error("Failed to store recording: {0}")]
    Storage(#[from] StorageError),
}

impl PipelineError {
    /// Whether running the same job again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Workspace { .. } | Self::Extraction(_) => true,
            Self::Resolve(ResolveError::VideoNotFound { .. }) => false,
            Self::Storage(StorageError::AlreadyExists(_) | StorageError::InvalidId(_)) => false,
            Self::Storage(_) => true,
        }
    }
}

impl From<PipelineError> for JobFailure {
    fn from(err: PipelineError) -> Self {
        Self {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PipelineWarning {
    Events(String),
    PackageMetadata(String),
    NoThumbnails,
    Cleanup { path: PathBuf, error: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Events(msg) => write!(f, "events: {}", msg),
            Self::PackageMetadata(msg) => write!(f, "package metadata: {}", msg),
            Self::NoThumbnails => write!(f, "thumbnails: none could be generated"),
            Self::Cleanup { path, error } => {
                write!(f, "cleanup of '{}' failed: {}", path.display(), error)
            }
        }
    }
}
