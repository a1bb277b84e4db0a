use std::io::Cursor;
use std::path::Path;
use std::process::{Command, Stdio};

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::config::ThumbnailConfig;
use crate::error::ThumbnailError;

/// Decodes the single frame at `timestamp` into `out` (format chosen by
/// the extension).
pub fn extract_frame(
    ffmpeg: &Path,
    video: &Path,
    timestamp: f64,
    out: &Path,
) -> Result<(), ThumbnailError> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .arg("-ss")
        .arg(format!("{:.3}", timestamp))
        .arg("-i")
        .arg(video)
        .args(["-frames:v", "1"])
        .arg(out)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ThumbnailError::Spawn {
            tool: ffmpeg.display().to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(ThumbnailError::FrameFailed {
            timestamp,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    // Seeking past the last decodable frame exits cleanly without output.
    if !out.is_file() {
        return Err(ThumbnailError::FrameFailed {
            timestamp,
            message: "no frame decoded".to_string(),
        });
    }

    Ok(())
}

/// Shrinks `image` to fit the configured box (never enlarging it) and
/// encodes it as JPEG.
pub fn encode_thumbnail(
    image: &DynamicImage,
    config: &ThumbnailConfig,
) -> Result<Vec<u8>, ThumbnailError> {
    let fitted = if image.width() > config.max_width || image.height() > config.max_height {
        image.thumbnail(config.max_width, config.max_height)
    } else {
        image.clone()
    };

    let rgb = fitted.to_rgb8();
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder =
            JpegEncoder::new_with_quality(&mut buffer, config.jpeg_quality.clamp(1, 100));
        encoder.encode_image(&rgb)?;
    }

    Ok(buffer.into_inner())
}
