//! Preview thumbnails sampled evenly across a recording.
//!
//! Sampling is best effort: a missing ffmpeg, an unreadable video or a bad
//! frame never fails the job, it just yields fewer (or zero) images.

pub mod frame;
pub mod probe;

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::{ThumbnailConfig, ToolsConfig};
use crate::error::ThumbnailError;

pub use frame::encode_thumbnail;
pub use probe::probe_duration;

/// Keeps the final seek inside the stream so `t = duration` still has a
/// frame to decode.
const END_GUARD_SECONDS: f64 = 0.05;

/// Step back used when a seek lands past the last decodable frame.
const RETRY_BACKOFF_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct ThumbnailSet {
    pub duration_seconds: Option<f64>,
    /// JPEG-encoded images in timestamp order.
    pub images: Vec<Vec<u8>>,
}

pub trait Thumbnailer: Send + Sync {
    /// Never fails; returns an empty set when nothing could be sampled.
    fn thumbnails(&self, video: &Path) -> ThumbnailSet;
}

/// Number of thumbnails for a video of `duration` seconds:
/// `clamp(floor(duration / seconds_per_thumbnail), 1, max_count)`.
pub fn thumbnail_count(duration: f64, seconds_per_thumbnail: f64, max_count: usize) -> usize {
    let max_count = max_count.max(1);
    if !duration.is_finite() || duration <= 0.0 || seconds_per_thumbnail <= 0.0 {
        return 1;
    }
    let raw = (duration / seconds_per_thumbnail).floor();
    if raw >= max_count as f64 {
        max_count
    } else {
        (raw as usize).max(1)
    }
}

/// Evenly spaced sample times from 0 to `duration` inclusive.
pub fn sample_timestamps(duration: f64, count: usize) -> Vec<f64> {
    let denominator = count.saturating_sub(1).max(1) as f64;
    (0..count)
        .map(|i| (i as f64 / denominator) * duration)
        .collect()
}

/// ffmpeg/ffprobe-backed sampler.
pub struct ThumbnailSampler {
    config: ThumbnailConfig,
    ffmpeg: String,
    ffprobe: String,
}

impl ThumbnailSampler {
    pub fn new(config: ThumbnailConfig, tools: &ToolsConfig) -> Self {
        Self {
            config,
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
        }
    }

    /// JPEG thumbnails for `video`; empty on any failure.
    pub fn sample(&self, video: &Path) -> Vec<Vec<u8>> {
        self.thumbnails(video).images
    }

    fn try_sample(&self, video: &Path) -> Result<ThumbnailSet, ThumbnailError> {
        let ffprobe = locate(&self.ffprobe)?;
        let ffmpeg = locate(&self.ffmpeg)?;

        let duration = probe_duration(&ffprobe, video)?;
        let count = thumbnail_count(
            duration,
            self.config.seconds_per_thumbnail,
            self.config.max_count,
        );
        debug!("Sampling {} thumbnails over {:.2}s", count, duration);

        let scratch = tempfile::Builder::new().prefix("thumbs-").tempdir()?;
        let latest = (duration - END_GUARD_SECONDS).max(0.0);

        let mut images = Vec::with_capacity(count);
        for (index, timestamp) in sample_timestamps(duration, count).into_iter().enumerate() {
            let frame_path = scratch.path().join(format!("frame_{:03}.png", index));
            match self.render(&ffmpeg, video, timestamp.min(latest), &frame_path) {
                Ok(jpeg) => images.push(jpeg),
                Err(e) => warn!("Dropping thumbnail {} at {:.2}s: {}", index, timestamp, e),
            }
        }

        Ok(ThumbnailSet {
            duration_seconds: Some(duration),
            images,
        })
    }

    fn render(
        &self,
        ffmpeg: &Path,
        video: &Path,
        seek: f64,
        frame_path: &Path,
    ) -> Result<Vec<u8>, ThumbnailError> {
        if let Err(e) = frame::extract_frame(ffmpeg, video, seek, frame_path) {
            if seek <= 0.0 {
                return Err(e);
            }
            let earlier = (seek - RETRY_BACKOFF_SECONDS).max(0.0);
            debug!("Retrying frame at {:.2}s after: {}", earlier, e);
            frame::extract_frame(ffmpeg, video, earlier, frame_path)?;
        }

        let image = image::open(frame_path)?;
        let jpeg = encode_thumbnail(&image, &self.config);
        if let Err(e) = std::fs::remove_file(frame_path) {
            debug!("Failed to remove frame {}: {}", frame_path.display(), e);
        }
        jpeg
    }
}

impl Thumbnailer for ThumbnailSampler {
    fn thumbnails(&self, video: &Path) -> ThumbnailSet {
        match self.try_sample(video) {
            Ok(set) => set,
            Err(e) => {
                warn!("Thumbnail sampling failed: {}", e);
                ThumbnailSet::default()
            }
        }
    }
}

fn locate(program: &str) -> Result<PathBuf, ThumbnailError> {
    which::which(program).map_err(|_| ThumbnailError::ToolMissing(program.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use std::process::Command;
    use tempfile::TempDir;

    #[test]
    fn test_thumbnail_count() {
        assert_eq!(thumbnail_count(3.0, 5.0, 12), 1);
        assert_eq!(thumbnail_count(27.0, 5.0, 12), 5);
        assert_eq!(thumbnail_count(120.0, 5.0, 12), 12);
        assert_eq!(thumbnail_count(0.0, 5.0, 12), 1);
        assert_eq!(thumbnail_count(f64::NAN, 5.0, 12), 1);
        assert_eq!(thumbnail_count(1e12, 5.0, 12), 12);
    }

    #[test]
    fn test_sample_timestamps() {
        assert_eq!(sample_timestamps(3.0, 1), vec![0.0]);
        assert_eq!(sample_timestamps(20.0, 5), vec![0.0, 5.0, 10.0, 15.0, 20.0]);
        assert_eq!(sample_timestamps(10.0, 2), vec![0.0, 10.0]);
    }

    #[test]
    fn test_missing_tools_yield_nothing() {
        let tmp = TempDir::new().unwrap();
        let video = tmp.path().join("video.mp4");
        std::fs::write(&video, b"not really a video").unwrap();

        let tools = ToolsConfig {
            ffmpeg: "capture-ingest-no-ffmpeg".to_string(),
            ffprobe: "capture-ingest-no-ffprobe".to_string(),
            ..ToolsConfig::default()
        };
        let sampler = ThumbnailSampler::new(ThumbnailConfig::default(), &tools);

        assert!(sampler.sample(&video).is_empty());
    }

    #[test]
    fn test_unreadable_video_yields_nothing() {
        if which::which("ffprobe").is_err() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let video = tmp.path().join("video.mp4");
        std::fs::write(&video, b"garbage bytes").unwrap();

        let sampler = ThumbnailSampler::new(ThumbnailConfig::default(), &ToolsConfig::default());
        let set = sampler.thumbnails(&video);

        assert!(set.images.is_empty());
        assert!(set.duration_seconds.is_none());
    }

    #[test]
    fn test_samples_real_video() {
        if which::which("ffmpeg").is_err() || which::which("ffprobe").is_err() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let video = tmp.path().join("video.mp4");
        let status = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-y", "-f", "lavfi", "-i"])
            .arg("testsrc=duration=12:size=640x400:rate=10")
            .args(["-pix_fmt", "yuv420p"])
            .arg(&video)
            .status()
            .unwrap();
        assert!(status.success());

        let sampler = ThumbnailSampler::new(ThumbnailConfig::default(), &ToolsConfig::default());
        let set = sampler.thumbnails(&video);

        assert!((set.duration_seconds.unwrap() - 12.0).abs() < 0.5);
        assert!(!set.images.is_empty());
        assert!(set.images.len() <= 2);
        for jpeg in &set.images {
            let (w, h) = image::load_from_memory(jpeg).unwrap().dimensions();
            assert!(w <= 320 && h <= 200);
        }
    }

    #[test]
    fn test_frame_file_is_discarded_after_encoding() {
        if which::which("ffmpeg").is_err() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let video = tmp.path().join("video.mp4");
        let status = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-y", "-f", "lavfi", "-i"])
            .arg("testsrc=duration=3:size=320x240:rate=10")
            .args(["-pix_fmt", "yuv420p"])
            .arg(&video)
            .status()
            .unwrap();
        assert!(status.success());

        let sampler = ThumbnailSampler::new(ThumbnailConfig::default(), &ToolsConfig::default());
        let ffmpeg = locate("ffmpeg").unwrap();
        let frame_path = tmp.path().join("frame_000.png");

        let jpeg = sampler.render(&ffmpeg, &video, 1.0, &frame_path).unwrap();

        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert!(!frame_path.exists());
    }
}
