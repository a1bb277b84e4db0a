//! Locates the video, event log and package metadata inside an extracted
//! upload.

pub mod events;
pub mod package;

use std::path::{Path, PathBuf};

use log::warn;
use walkdir::WalkDir;

use crate::error::ResolveError;

pub use events::EventLog;
pub use package::PackageMetadata;

/// Extensions treated as a raw video upload that needs no extraction.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "avi", "m4v"];

pub const VIDEO_CANDIDATES: &[&str] = &["video.mp4", "screen.mp4", "recording.mp4", "capture.mp4"];

pub const EVENTS_CANDIDATES: &[&str] = &["events.json", "input.json", "actions.json"];

pub const PACKAGE_METADATA_FILE: &str = "metadata.json";

const IGNORED_DIRECTORIES: &[&str] = &["__MACOSX"];

/// True when `file_name` carries a known video container extension.
pub fn is_video_container(file_name: &str) -> bool {
    container_extension(file_name).is_some()
}

/// The lowercased extension of `file_name` when it names a known video
/// container.
pub fn container_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
}

#[derive(Debug, Clone)]
pub struct ResolvedAssets {
    pub video_path: PathBuf,
    pub events: EventLog,
    pub events_path: Option<PathBuf>,
    pub package: Option<PackageMetadata>,
    /// Why the event log degraded to an empty one, if it did.
    pub events_warning: Option<String>,
    pub package_warning: Option<String>,
}

impl ResolvedAssets {
    /// An upload that is the video itself and carries no event log.
    pub fn raw_video(path: &Path) -> Self {
        Self {
            video_path: path.to_path_buf(),
            events: EventLog::empty(),
            events_path: None,
            package: None,
            events_warning: None,
            package_warning: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AssetResolver;

impl AssetResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, dir: &Path) -> Result<ResolvedAssets, ResolveError> {
        let video_path =
            find_candidate(dir, VIDEO_CANDIDATES).ok_or_else(|| ResolveError::VideoNotFound {
                directory: dir.to_path_buf(),
                searched: VIDEO_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            })?;

        let mut events_warning = None;
        let mut package_warning = None;

        let events_path = find_candidate(dir, EVENTS_CANDIDATES);
        let events = match &events_path {
            Some(path) => match EventLog::load(path) {
                Ok(log) => log,
                Err(e) => {
                    warn!("Ignoring unusable event log: {}", e);
                    events_warning = Some(e.to_string());
                    EventLog::empty()
                }
            },
            None => {
                events_warning = Some(format!(
                    "No event log found (looked for {})",
                    EVENTS_CANDIDATES.join(", ")
                ));
                EventLog::empty()
            }
        };

        let package = find_candidate(dir, &[PACKAGE_METADATA_FILE]).and_then(|path| {
            match PackageMetadata::load(&path) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!("Ignoring unreadable package metadata: {}", e);
                    package_warning = Some(e.to_string());
                    None
                }
            }
        });

        Ok(ResolvedAssets {
            video_path,
            events,
            events_path,
            package,
            events_warning,
            package_warning,
        })
    }
}

/// First existing file among `names`, checked at the top level of `dir`
/// and then inside each immediate subdirectory.
fn find_candidate(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    let top_level = names.iter().map(|name| dir.join(name)).find(|p| p.is_file());
    if top_level.is_some() {
        return top_level;
    }

    let subdirs: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && !IGNORED_DIRECTORIES.contains(&&*name)
        })
        .map(|entry| entry.into_path())
        .collect();

    names
        .iter()
        .flat_map(|name| subdirs.iter().map(move |sub| sub.join(name)))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_video_container_detection() {
        assert!(is_video_container("session.mp4"));
        assert!(is_video_container("SESSION.MOV"));
        assert!(is_video_container("clip.webm"));
        assert!(!is_video_container("upload.zip"));
        assert!(!is_video_container("mp4"));
    }

    #[test]
    fn test_container_extension() {
        assert_eq!(container_extension("Session.WEBM").as_deref(), Some("webm"));
        assert_eq!(container_extension("clip.mov").as_deref(), Some("mov"));
        assert_eq!(container_extension("upload.zip"), None);
        assert_eq!(container_extension("upload-7f3e"), None);
    }

    #[test]
    fn test_candidate_priority() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("capture.mp4"), b"c").unwrap();
        fs::write(tmp.path().join("screen.mp4"), b"s").unwrap();
        fs::write(tmp.path().join("actions.json"), "[]").unwrap();
        fs::write(tmp.path().join("input.json"), r#"[{"t":1}]"#).unwrap();

        let resolved = AssetResolver::new().resolve(tmp.path()).unwrap();

        assert_eq!(resolved.video_path, tmp.path().join("screen.mp4"));
        assert_eq!(resolved.events_path, Some(tmp.path().join("input.json")));
        assert_eq!(resolved.events.len(), 1);
    }

    #[test]
    fn test_nested_folder_is_searched() {
        let tmp = TempDir::new().unwrap();
        let macos = tmp.path().join("__MACOSX").join("session");
        fs::create_dir_all(&macos).unwrap();
        let nested = tmp.path().join("session");
        fs::create_dir(&nested).unwrap();
        fs::write(tmp.path().join("__MACOSX").join("video.mp4"), b"resource fork").unwrap();
        fs::write(nested.join("video.mp4"), b"v").unwrap();
        fs::write(nested.join("events.json"), r#"{"events":[{"t":0}]}"#).unwrap();

        let resolved = AssetResolver::new().resolve(tmp.path()).unwrap();

        assert_eq!(resolved.video_path, nested.join("video.mp4"));
        assert_eq!(resolved.events.len(), 1);
    }

    #[test]
    fn test_no_video_is_an_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notes.txt"), b"hello").unwrap();

        let err = AssetResolver::new().resolve(tmp.path()).unwrap_err();
        let ResolveError::VideoNotFound { searched, .. } = err;
        assert_eq!(searched.len(), VIDEO_CANDIDATES.len());
    }

    #[test]
    fn test_corrupt_events_degrade_to_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("video.mp4"), b"v").unwrap();
        fs::write(tmp.path().join("events.json"), b"{{{{").unwrap();

        let resolved = AssetResolver::new().resolve(tmp.path()).unwrap();

        assert!(resolved.events.is_empty());
        assert!(resolved.events_warning.unwrap().contains("not valid JSON"));
    }

    #[test]
    fn test_missing_events_degrade_to_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("video.mp4"), b"v").unwrap();

        let resolved = AssetResolver::new().resolve(tmp.path()).unwrap();

        assert!(resolved.events.is_empty());
        assert!(resolved.events_path.is_none());
        assert!(resolved.events_warning.is_some());
    }

    #[test]
    fn test_package_metadata_is_optional() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("video.mp4"), b"v").unwrap();
        fs::write(tmp.path().join("metadata.json"), r#"{"fps":10,"resolution":[1280,800]}"#).unwrap();

        let resolved = AssetResolver::new().resolve(tmp.path()).unwrap();
        assert_eq!(resolved.package.unwrap().fps, Some(10.0));

        fs::write(tmp.path().join("metadata.json"), b"garbage").unwrap();
        let resolved = AssetResolver::new().resolve(tmp.path()).unwrap();
        assert!(resolved.package.is_none());
        assert!(resolved.package_warning.is_some());
    }
}
