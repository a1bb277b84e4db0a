use std::path::PathBuf;

use crate::resolve::ResolvedAssets;
use crate::scheduler::Job;
use crate::storage::RecordingAssets;
use crate::thumbnail::ThumbnailSet;

use super::error::PipelineWarning;

pub struct PipelineContext {
    pub job: Job,

    // Per-job extraction directory, removed when the run ends
    pub workspace: Option<PathBuf>,

    // Name of the extraction strategy that worked; None for raw video uploads
    pub extraction_strategy: Option<&'static str>,

    // Guaranteed Some after step_prepare_assets
    pub assets: Option<ResolvedAssets>,

    pub thumbnails: ThumbnailSet,

    // Guaranteed Some after step_store
    pub stored: Option<RecordingAssets>,

    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            workspace: None,
            extraction_strategy: None,
            assets: None,
            thumbnails: ThumbnailSet::default(),
            stored: None,
            warnings: Vec::new(),
        }
    }
}
