use std::fs::{self, File};
use std::io;
use std::path::Path;

use log::warn;

use crate::error::StrategyError;
use crate::extract::ExtractionStrategy;

/// In-process extraction through the `zip` crate.
pub struct ZipLibraryStrategy;

impl ExtractionStrategy for ZipLibraryStrategy {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn attempt_extract(&self, source: &Path, dest: &Path) -> Result<(), StrategyError> {
        let file = File::open(source)?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| StrategyError::Archive(e.to_string()))?;

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| StrategyError::Archive(e.to_string()))?;

            // Entries with absolute paths or `..` components would land
            // outside the target directory.
            let relative = match entry.enclosed_name() {
                Some(path) => path,
                None => {
                    return Err(StrategyError::Archive(format!(
                        "entry '{}' escapes the extraction directory",
                        entry.name()
                    )));
                }
            };
            let out_path = dest.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&out_path)?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }

            let mut out = File::create(&out_path)?;
            if let Err(e) = io::copy(&mut entry, &mut out) {
                warn!("Failed to inflate zip entry {}: {}", entry.name(), e);
                return Err(StrategyError::Archive(format!(
                    "failed to inflate '{}': {}",
                    entry.name(),
                    e
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_extracts_nested_entries() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("upload.zip");
        write_zip(
            &archive,
            &[
                ("session/video.mp4", b"frames"),
                ("session/events.json", b"{\"events\":[]}"),
            ],
        );

        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();
        ZipLibraryStrategy.attempt_extract(&archive, &dest).unwrap();

        assert_eq!(fs::read(dest.join("session/video.mp4")).unwrap(), b"frames");
        assert!(dest.join("session/events.json").is_file());
    }

    #[test]
    fn test_rejects_path_traversal() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("evil.zip");
        write_zip(&archive, &[("../escaped.txt", b"gotcha")]);

        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();
        let err = ZipLibraryStrategy.attempt_extract(&archive, &dest).unwrap_err();

        assert!(err.to_string().contains("escapes"));
        assert!(!tmp.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_not_a_zip() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("plain.zip");
        fs::write(&archive, b"plain text").unwrap();

        let dest = tmp.path().join("out");
        fs::create_dir(&dest).unwrap();
        let err = ZipLibraryStrategy.attempt_extract(&archive, &dest).unwrap_err();

        assert!(matches!(err, StrategyError::Archive(_)));
    }
}
