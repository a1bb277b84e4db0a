use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use capture_ingest::scheduler::{RecordingProcessor, SchedulerOptions};
use capture_ingest::thumbnail::{ThumbnailSet, Thumbnailer};
use capture_ingest::{Config, JobScheduler, Pipeline, PipelineConfig, RecordingStore};

/// Generous bound for waiting on background jobs.
pub const WAIT: Duration = Duration::from_secs(30);

/// Returns a fixed number of tiny JPEG-looking buffers.
pub struct StubThumbnailer {
    pub count: usize,
}

impl Thumbnailer for StubThumbnailer {
    fn thumbnails(&self, _video: &Path) -> ThumbnailSet {
        ThumbnailSet {
            duration_seconds: Some(self.count as f64 * 5.0),
            images: vec![vec![0xFF, 0xD8, 0xFF, 0xD9]; self.count],
        }
    }
}

/// `{ "meta": {...}, "events": [n events] }` as the recorder writes it.
pub fn events_json(n: usize) -> String {
    let events: Vec<serde_json::Value> = (0..n)
        .map(|i| serde_json::json!({ "t": i as f64 * 0.5, "type": "mouse_move", "x": i, "y": i }))
        .collect();
    serde_json::json!({
        "meta": { "fps": 10, "resolution": [1280, 800], "start_time": 1712311200.0 },
        "events": events,
    })
    .to_string()
}

pub struct TestHarness {
    temp_dir: TempDir,
    /// Where test uploads are written before being enqueued.
    pub uploads_dir: PathBuf,
    /// The service data directory (queue, recordings, work).
    pub data_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let uploads_dir = temp_dir.path().join("uploads");
        let data_dir = temp_dir.path().join("data");
        std::fs::create_dir_all(&uploads_dir).expect("Failed to create uploads dir");

        Self {
            temp_dir,
            uploads_dir,
            data_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config(&self) -> Config {
        let mut config = Config::with_data_directory(&self.data_dir);
        config.poll_interval_ms = 20;
        config
    }

    pub fn write_upload(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.uploads_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write upload");
        path
    }

    pub fn write_zip(&self, filename: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.uploads_dir.join(filename);
        let file = std::fs::File::create(&path).expect("Failed to create zip");
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).expect("Failed to start zip entry");
            writer.write_all(data).expect("Failed to write zip entry");
        }
        writer.finish().expect("Failed to finish zip");
        path
    }

    pub fn store(&self) -> Arc<RecordingStore> {
        Arc::new(RecordingStore::new(
            self.config().recordings_directory().unwrap(),
        ))
    }

    /// Production pipeline with thumbnailing stubbed out.
    pub fn pipeline(&self, store: Arc<RecordingStore>, thumbnails: usize) -> Pipeline {
        let config = Arc::new(PipelineConfig::from_config(&self.config()).unwrap());
        Pipeline::from_config(config, store)
            .with_thumbnailer(Box::new(StubThumbnailer { count: thumbnails }))
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions::from_config(&self.config()).unwrap()
    }

    pub fn scheduler(&self, processor: Arc<dyn RecordingProcessor>) -> JobScheduler {
        JobScheduler::open(self.scheduler_options(), processor).expect("Failed to open scheduler")
    }

    pub fn recording_dir(&self, recording_id: &str) -> PathBuf {
        self.data_dir.join("recordings").join(recording_id)
    }
}
