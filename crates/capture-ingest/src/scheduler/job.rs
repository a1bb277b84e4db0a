use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SchedulerError;
use crate::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Client clock reading attached to an upload. Recorders send epoch
/// seconds; RFC 3339 strings are accepted too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadTimestamp {
    Epoch(f64),
    Text(String),
}

impl UploadTimestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Epoch(secs) if secs.is_finite() => {
                let millis = (secs * 1000.0).round() as i64;
                Utc.timestamp_millis_opt(millis).single()
            }
            Self::Epoch(_) => None,
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Attributes the uploader attached to the artifact. Unknown keys are kept
/// verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<UploadTimestamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UploadMeta {
    pub fn upload_time(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_ref().and_then(UploadTimestamp::to_datetime)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub recording_id: String,
    pub source_file_path: PathBuf,
    /// Name the file had on the client, used to spot raw video uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    #[serde(default)]
    pub upload_meta: UploadMeta,
}

impl JobPayload {
    pub fn new(recording_id: impl Into<String>, source_file_path: impl Into<PathBuf>) -> Self {
        Self {
            recording_id: recording_id.into(),
            source_file_path: source_file_path.into(),
            original_filename: None,
            upload_meta: UploadMeta::default(),
        }
    }

    pub fn with_original_filename(mut self, name: impl Into<String>) -> Self {
        self.original_filename = Some(name.into());
        self
    }

    pub fn with_upload_meta(mut self, meta: UploadMeta) -> Self {
        self.upload_meta = meta;
        self
    }

    /// The upload's file name as the client knew it, falling back to the
    /// name on disk.
    pub fn file_name(&self) -> String {
        self.original_filename
            .clone()
            .unwrap_or_else(|| sanitize::redact_path(&self.source_file_path))
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !sanitize::is_safe_id(&self.recording_id) {
            return Err(SchedulerError::InvalidPayload(format!(
                "recording id {:?} must be 1-128 characters of [A-Za-z0-9._-] and not start with '.'",
                self.recording_id
            )));
        }
        if !Path::new(&self.source_file_path).is_file() {
            return Err(SchedulerError::InvalidPayload(format!(
                "source file '{}' does not exist",
                self.source_file_path.display()
            )));
        }
        Ok(())
    }
}

/// Summary of a successfully processed recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub recording_id: String,
    pub event_count: usize,
    pub thumbnail_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Recoverable problems met along the way.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A failed processing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub message: String,
    pub retryable: bool,
}

impl JobFailure {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub recording_id: String,
    pub status: JobStatus,
    pub payload: JobPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Error of the most recent attempt while a retry is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(payload: JobPayload) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            recording_id: payload.recording_id.clone(),
            status: JobStatus::Pending,
            payload,
            result: None,
            error: None,
            enqueued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            attempts: 0,
            next_attempt_at: None,
            last_error: None,
        }
    }

    /// True when a pending job may be picked up at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    pub(crate) fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        self.next_attempt_at = None;
        self.attempts += 1;
    }

    pub(crate) fn mark_completed(&mut self, outcome: JobOutcome, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.result = Some(outcome);
        self.error = None;
        self.last_error = None;
        self.completed_at = Some(now);
    }

    pub(crate) fn mark_failed(&mut self, message: String, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.error = Some(message);
        self.last_error = None;
        self.completed_at = Some(now);
    }

    pub(crate) fn schedule_retry(&mut self, message: String, at: DateTime<Utc>) {
        self.status = JobStatus::Pending;
        self.last_error = Some(message);
        self.next_attempt_at = Some(at);
    }

    /// Returns a job that was interrupted mid-run to the queue.
    pub(crate) fn demote_interrupted(&mut self) {
        self.status = JobStatus::Pending;
        self.started_at = None;
        self.next_attempt_at = None;
    }
}
