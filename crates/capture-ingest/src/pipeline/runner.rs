use std::sync::Arc;

use tracing::{debug, info_span, warn};

use crate::extract::ArchiveExtractor;
use crate::resolve::{container_extension, is_video_container, AssetResolver, ResolvedAssets};
use crate::sanitize;
use crate::scheduler::{Job, JobFailure, JobOutcome, RecordingProcessor};
use crate::storage::{RecordingAttributes, RecordingStore};
use crate::thumbnail::{ThumbnailSampler, Thumbnailer};

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineError, PipelineWarning};

/// Turns one uploaded artifact into a stored recording:
/// extract, resolve, sample thumbnails, store.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    extractor: ArchiveExtractor,
    resolver: AssetResolver,
    thumbnailer: Box<dyn Thumbnailer>,
    store: Arc<RecordingStore>,
}

impl Pipeline {
    /// Production constructor: builds all sub-components from config.
    pub fn from_config(config: Arc<PipelineConfig>, store: Arc<RecordingStore>) -> Self {
        let extractor = ArchiveExtractor::new(&config.tools);
        let thumbnailer = Box::new(ThumbnailSampler::new(
            config.thumbnails.clone(),
            &config.tools,
        ));

        Self {
            config,
            extractor,
            resolver: AssetResolver::new(),
            thumbnailer,
            store,
        }
    }

    pub fn with_thumbnailer(mut self, thumbnailer: Box<dyn Thumbnailer>) -> Self {
        self.thumbnailer = thumbnailer;
        self
    }

    pub fn with_extractor(mut self, extractor: ArchiveExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn store(&self) -> &Arc<RecordingStore> {
        &self.store
    }

    /// Run the full pipeline for a single job.
    pub fn run(
        &self,
        mut ctx: PipelineContext,
    ) -> (Result<JobOutcome, PipelineError>, PipelineContext) {
        let filename = sanitize::redact_path(&ctx.job.payload.source_file_path);
        let _pipeline_span = info_span!("pipeline",
            job_id = %ctx.job.job_id,
            recording_id = %ctx.job.recording_id,
            filename = %filename,
            attempt = ctx.job.attempts,
        )
        .entered();

        let result = self.run_steps(&mut ctx);
        self.step_cleanup(&mut ctx);

        let result = result.map(|()| {
            let stored = ctx.stored.as_ref().map(|s| &s.metadata);
            JobOutcome {
                recording_id: ctx.job.recording_id.clone(),
                event_count: stored.map(|m| m.event_count).unwrap_or_default(),
                thumbnail_count: stored.map(|m| m.thumbnail_count).unwrap_or_default(),
                duration_seconds: ctx.thumbnails.duration_seconds,
                warnings: ctx.warnings.iter().map(|w| w.to_string()).collect(),
            }
        });

        (result, ctx)
    }

    fn run_steps(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        {
            let _step = info_span!("prepare_assets").entered();
            self.step_prepare_assets(ctx)?;
        }

        {
            let _step = info_span!("sample_thumbnails").entered();
            self.step_sample_thumbnails(ctx);
        }

        {
            let _step = info_span!("store").entered();
            self.step_store(ctx)?;
        }

        Ok(())
    }

    /// Raw video uploads are used as-is; anything else is extracted and
    /// searched for the video and event log.
    fn step_prepare_assets(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let payload = &ctx.job.payload;

        if is_video_container(&payload.file_name()) {
            debug!("Treating {} as a raw video upload", payload.file_name());
            ctx.assets = Some(ResolvedAssets::raw_video(&payload.source_file_path));
            return Ok(());
        }

        std::fs::create_dir_all(&self.config.work_directory).map_err(|e| {
            PipelineError::Workspace {
                path: self.config.work_directory.clone(),
                source: e,
            }
        })?;
        let workspace = self.config.work_directory.join(&ctx.job.job_id);
        ctx.workspace = Some(workspace.clone());

        let strategy = self
            .extractor
            .extract(&payload.source_file_path, &workspace)?;
        ctx.extraction_strategy = Some(strategy);

        let assets = self.resolver.resolve(&workspace)?;
        if let Some(msg) = &assets.events_warning {
            ctx.warnings.push(PipelineWarning::Events(msg.clone()));
        }
        if let Some(msg) = &assets.package_warning {
            ctx.warnings.push(PipelineWarning::PackageMetadata(msg.clone()));
        }
        debug!(
            "Resolved video {} with {} events",
            sanitize::redact_path(&assets.video_path),
            assets.events.len()
        );
        ctx.assets = Some(assets);

        Ok(())
    }

    fn step_sample_thumbnails(&self, ctx: &mut PipelineContext) {
        let Some(assets) = ctx.assets.as_ref() else {
            return;
        };

        ctx.thumbnails = self.thumbnailer.thumbnails(&assets.video_path);
        if ctx.thumbnails.images.is_empty() {
            warn!("No thumbnails generated for {}", ctx.job.recording_id);
            ctx.warnings.push(PipelineWarning::NoThumbnails);
        }
    }

    fn step_store(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let Some(assets) = ctx.assets.as_ref() else {
            return Ok(());
        };
        let payload = &ctx.job.payload;
        let meta = &payload.upload_meta;

        let attributes = RecordingAttributes {
            upload_timestamp: meta.upload_time().unwrap_or(ctx.job.enqueued_at),
            machine: meta.machine.clone(),
            os: meta.os.clone(),
            original_filename: payload.original_filename.clone(),
            duration_seconds: ctx.thumbnails.duration_seconds,
            // Raw uploads may sit on disk under a name without an extension.
            video_extension: container_extension(&payload.file_name()),
            package: assets.package.clone(),
            extra: meta.extra.clone(),
        };

        let stored = self.store.save(
            &ctx.job.recording_id,
            &assets.video_path,
            &assets.events,
            &ctx.thumbnails.images,
            attributes,
        )?;
        ctx.stored = Some(stored);

        Ok(())
    }

    fn step_cleanup(&self, ctx: &mut PipelineContext) {
        let Some(workspace) = ctx.workspace.take() else {
            return;
        };
        if !workspace.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&workspace) {
            warn!("Failed to remove workspace {}: {}", workspace.display(), e);
            ctx.warnings.push(PipelineWarning::Cleanup {
                path: workspace,
                error: e.to_string(),
            });
        }
    }
}

impl RecordingProcessor for Pipeline {
    fn process(&self, job: &Job) -> Result<JobOutcome, JobFailure> {
        let (result, _ctx) = self.run(PipelineContext::new(job.clone()));
        result.map_err(JobFailure::from)
    }
}
