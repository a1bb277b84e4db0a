use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PackageMetadataError;

/// Client-side description of a recording package (`metadata.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Vec<u32>>,
    /// Duration as measured by the recorder, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl PackageMetadata {
    pub fn load(path: &Path) -> Result<Self, PackageMetadataError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PackageMetadataError::Read {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_client_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.json");
        std::fs::write(
            &path,
            r#"{"id":"rec-1","timestamp":"2024-04-05T10:00:00","duration":42.5,"resolution":[1280,800],"fps":10}"#,
        )
        .unwrap();

        let meta = PackageMetadata::load(&path).unwrap();
        assert_eq!(meta.fps, Some(10.0));
        assert_eq!(meta.resolution, Some(vec![1280, 800]));
        assert_eq!(meta.duration, Some(42.5));
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.json");
        std::fs::write(&path, r#"{"fps":"ten"}"#).unwrap();

        let err = PackageMetadata::load(&path).unwrap_err();
        assert!(matches!(err, PackageMetadataError::Json(_)));
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let tmp = TempDir::new().unwrap();
        let err = PackageMetadata::load(&tmp.path().join("metadata.json")).unwrap_err();
        assert!(matches!(err, PackageMetadataError::Read { .. }));
        assert!(err.to_string().starts_with("Failed to read package metadata"));
    }
}
