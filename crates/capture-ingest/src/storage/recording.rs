use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StorageError;
use crate::resolve::{EventLog, PackageMetadata};
use crate::sanitize;
use crate::storage::filesystem::{copy_file, ensure_directory, write_new};

const METADATA_FILE: &str = "metadata.json";
const EVENTS_FILE: &str = "events.json";
const THUMBNAILS_DIR: &str = "thumbnails";
const STAGING_DIR: &str = ".staging";
const DEFAULT_VIDEO_EXTENSION: &str = "mp4";

pub fn thumbnail_file_name(index: usize) -> String {
    format!("thumb_{:03}.jpg", index)
}

/// Caller-supplied facts about a recording, everything `save` cannot
/// derive from the assets themselves.
#[derive(Debug, Clone)]
pub struct RecordingAttributes {
    pub upload_timestamp: DateTime<Utc>,
    pub machine: Option<String>,
    pub os: Option<String>,
    pub original_filename: Option<String>,
    pub duration_seconds: Option<f64>,
    /// Container extension for the stored video. Defaults to the source
    /// file's own extension.
    pub video_extension: Option<String>,
    pub package: Option<PackageMetadata>,
    pub extra: Map<String, Value>,
}

impl RecordingAttributes {
    pub fn new(upload_timestamp: DateTime<Utc>) -> Self {
        Self {
            upload_timestamp,
            machine: None,
            os: None,
            original_filename: None,
            duration_seconds: None,
            video_extension: None,
            package: None,
            extra: Map::new(),
        }
    }
}

/// Contents of `<recording>/metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub recording_id: String,
    pub created_at: DateTime<Utc>,
    pub upload_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    pub event_count: usize,
    pub thumbnail_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub video_file: String,
    pub video_mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageMetadata>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Filesystem locations of a stored recording's assets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetLocators {
    pub directory: PathBuf,
    pub video: PathBuf,
    pub events: PathBuf,
    pub thumbnails: Vec<PathBuf>,
}

impl AssetLocators {
    fn for_recording(directory: PathBuf, metadata: &RecordingMetadata) -> Self {
        let thumbs_dir = directory.join(THUMBNAILS_DIR);
        Self {
            video: directory.join(&metadata.video_file),
            events: directory.join(EVENTS_FILE),
            thumbnails: (0..metadata.thumbnail_count)
                .map(|i| thumbs_dir.join(thumbnail_file_name(i)))
                .collect(),
            directory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingAssets {
    #[serde(flatten)]
    pub metadata: RecordingMetadata,
    pub locators: AssetLocators,
}

impl RecordingAssets {
    pub fn recording_id(&self) -> &str {
        &self.metadata.recording_id
    }
}

/// Durable, write-once storage of processed recordings under
/// `<root>/<recording_id>/`.
pub struct RecordingStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, RecordingAssets>>,
}

impl RecordingStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes every asset into a private staging directory and publishes it
    /// with a single rename, so `metadata.json` is never visible without
    /// the assets it describes.
    pub fn save(
        &self,
        recording_id: &str,
        video: &Path,
        events: &EventLog,
        thumbnails: &[Vec<u8>],
        attributes: RecordingAttributes,
    ) -> Result<RecordingAssets, StorageError> {
        if !sanitize::is_safe_id(recording_id) {
            return Err(StorageError::InvalidId(recording_id.to_string()));
        }

        let final_dir = self.root.join(recording_id);
        if final_dir.exists() {
            return Err(StorageError::AlreadyExists(recording_id.to_string()));
        }

        let staging_root = self.root.join(STAGING_DIR);
        ensure_directory(&staging_root)?;
        let staging = staging_root.join(format!("{}-{}", recording_id, uuid::Uuid::new_v4()));

        let result = self
            .write_staged(&staging, recording_id, video, events, thumbnails, attributes)
            .and_then(|metadata| self.commit(&staging, &final_dir, metadata));

        if result.is_err() && staging.exists() {
            if let Err(e) = std::fs::remove_dir_all(&staging) {
                warn!("Failed to discard staging directory for {}: {}", recording_id, e);
            }
        }

        let assets = result?;
        info!(
            "Stored recording {} ({} events, {} thumbnails)",
            recording_id, assets.metadata.event_count, assets.metadata.thumbnail_count
        );
        self.cache_write()
            .insert(recording_id.to_string(), assets.clone());

        Ok(assets)
    }

    fn write_staged(
        &self,
        staging: &Path,
        recording_id: &str,
        video: &Path,
        events: &EventLog,
        thumbnails: &[Vec<u8>],
        attributes: RecordingAttributes,
    ) -> Result<RecordingMetadata, StorageError> {
        let thumbs_dir = staging.join(THUMBNAILS_DIR);
        ensure_directory(&thumbs_dir)?;

        let extension = attributes
            .video_extension
            .as_deref()
            .or_else(|| video.extension().and_then(|e| e.to_str()))
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_VIDEO_EXTENSION.to_string());
        let video_file = format!("video.{}", extension);
        copy_file(video, &staging.join(&video_file))?;

        let events_json = serde_json::to_vec_pretty(events).map_err(|e| StorageError::Serialize {
            what: "event log",
            source: e,
        })?;
        write_new(&staging.join(EVENTS_FILE), &events_json)?;

        for (index, image) in thumbnails.iter().enumerate() {
            write_new(&thumbs_dir.join(thumbnail_file_name(index)), image)?;
        }

        let metadata = RecordingMetadata {
            recording_id: recording_id.to_string(),
            created_at: Utc::now(),
            upload_timestamp: attributes.upload_timestamp,
            machine: attributes.machine,
            os: attributes.os,
            original_filename: attributes.original_filename,
            event_count: events.len(),
            thumbnail_count: thumbnails.len(),
            duration_seconds: attributes.duration_seconds,
            video_mime: mime_guess::from_path(&video_file)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
            video_file,
            package: attributes.package,
            extra: attributes.extra,
        };

        let metadata_json =
            serde_json::to_vec_pretty(&metadata).map_err(|e| StorageError::Serialize {
                what: "recording metadata",
                source: e,
            })?;
        write_new(&staging.join(METADATA_FILE), &metadata_json)?;

        Ok(metadata)
    }

    fn commit(
        &self,
        staging: &Path,
        final_dir: &Path,
        metadata: RecordingMetadata,
    ) -> Result<RecordingAssets, StorageError> {
        if let Err(e) = std::fs::rename(staging, final_dir) {
            if final_dir.join(METADATA_FILE).exists() {
                return Err(StorageError::AlreadyExists(metadata.recording_id));
            }
            return Err(StorageError::Commit {
                recording_id: metadata.recording_id,
                source: e,
            });
        }

        Ok(RecordingAssets {
            locators: AssetLocators::for_recording(final_dir.to_path_buf(), &metadata),
            metadata,
        })
    }

    /// Looks up a stored recording. `Ok(None)` when nothing is stored under
    /// `recording_id`.
    pub fn get(&self, recording_id: &str) -> Result<Option<RecordingAssets>, StorageError> {
        if let Some(hit) = self.cache_read().get(recording_id) {
            return Ok(Some(hit.clone()));
        }

        if !sanitize::is_safe_id(recording_id) {
            return Ok(None);
        }

        let directory = self.root.join(recording_id);
        let metadata_path = directory.join(METADATA_FILE);
        let content = match std::fs::read(&metadata_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::ReadMetadata {
                    path: metadata_path,
                    source: e,
                })
            }
        };
        let metadata: RecordingMetadata =
            serde_json::from_slice(&content).map_err(|e| StorageError::CorruptMetadata {
                path: metadata_path.clone(),
                source: e,
            })?;

        debug!("Loaded metadata for recording {}", recording_id);
        let assets = RecordingAssets {
            locators: AssetLocators::for_recording(directory, &metadata),
            metadata,
        };
        self.cache_write()
            .insert(recording_id.to_string(), assets.clone());

        Ok(Some(assets))
    }

    /// All stored recordings, newest first.
    pub fn list(&self) -> Result<Vec<RecordingAssets>, StorageError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::ReadMetadata {
                    path: self.root.clone(),
                    source: e,
                })
            }
        };

        let mut recordings = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name();
            let Some(id) = name.to_str() else {
                continue;
            };
            if !sanitize::is_safe_id(id) {
                continue;
            }
            match self.get(id) {
                Ok(Some(assets)) => recordings.push(assets),
                Ok(None) => debug!("Skipping {} without metadata", id),
                Err(e) => warn!("Skipping unreadable recording {}: {}", id, e),
            }
        }

        recordings.sort_by(|a, b| {
            b.metadata
                .created_at
                .cmp(&a.metadata.created_at)
                .then_with(|| a.metadata.recording_id.cmp(&b.metadata.recording_id))
        });

        Ok(recordings)
    }

    fn cache_read(&self) -> RwLockReadGuard<'_, HashMap<String, RecordingAssets>> {
        match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Recording cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn cache_write(&self) -> RwLockWriteGuard<'_, HashMap<String, RecordingAssets>> {
        match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Recording cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
