use std::path::Path;
use std::process::{Command, Stdio};

use serde::Deserialize;

use crate::error::ThumbnailError;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    // ffprobe prints numbers as strings in its JSON writer.
    duration: Option<String>,
}

/// Container duration in seconds as reported by ffprobe.
pub fn probe_duration(ffprobe: &Path, video: &Path) -> Result<f64, ThumbnailError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(video)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ThumbnailError::Spawn {
            tool: ffprobe.display().to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(ThumbnailError::ProbeFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    parse_duration(&output.stdout)
}

fn parse_duration(stdout: &[u8]) -> Result<f64, ThumbnailError> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| ThumbnailError::ProbeFailed(format!("unreadable ffprobe output: {}", e)))?;

    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .ok_or_else(|| ThumbnailError::ProbeFailed("no duration reported".to_string()))?;

    if duration.is_finite() && duration > 0.0 {
        Ok(duration)
    } else {
        Err(ThumbnailError::InvalidDuration(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        let out = br#"{ "format": { "duration": "27.400000" } }"#;
        assert!((parse_duration(out).unwrap() - 27.4).abs() < 1e-9);
    }

    #[test]
    fn test_missing_duration() {
        let out = br#"{ "format": {} }"#;
        assert!(matches!(parse_duration(out), Err(ThumbnailError::ProbeFailed(_))));
    }

    #[test]
    fn test_zero_duration() {
        let out = br#"{ "format": { "duration": "0.000000" } }"#;
        assert!(matches!(
            parse_duration(out),
            Err(ThumbnailError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_not_applicable_duration() {
        let out = br#"{ "format": { "duration": "N/A" } }"#;
        assert!(parse_duration(out).is_err());
    }
}
