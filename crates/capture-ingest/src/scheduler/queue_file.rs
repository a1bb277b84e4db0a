use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::scheduler::job::{Job, JobStatus};

pub const QUEUE_FORMAT_VERSION: u32 = 1;

/// Everything the scheduler knows, as written to `jobs.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub version: u32,
    #[serde(default)]
    pub pending: Vec<Job>,
    #[serde(default)]
    pub active: BTreeMap<String, Job>,
    /// Terminal jobs, oldest first.
    #[serde(default)]
    pub history: Vec<Job>,
}

impl Default for QueueSnapshot {
    fn default() -> Self {
        Self {
            version: QUEUE_FORMAT_VERSION,
            pending: Vec::new(),
            active: BTreeMap::new(),
            history: Vec::new(),
        }
    }
}

/// Queue state rebuilt from a snapshot after a restart.
#[derive(Debug, Default)]
pub struct RestoredQueue {
    pub pending: VecDeque<Job>,
    pub history: VecDeque<Job>,
    /// Jobs that were mid-run when the process stopped.
    pub interrupted: usize,
}

impl QueueSnapshot {
    /// Sorts every job back into place by its status. Jobs caught in
    /// `processing` run first, in the order they were started.
    pub fn restore(self) -> RestoredQueue {
        let mut interrupted: Vec<Job> = Vec::new();
        let mut pending = VecDeque::new();
        let mut history = VecDeque::new();

        let all = self
            .active
            .into_values()
            .chain(self.pending)
            .chain(self.history);

        for mut job in all {
            match job.status {
                JobStatus::Processing => {
                    job.demote_interrupted();
                    interrupted.push(job);
                }
                JobStatus::Pending => pending.push_back(job),
                JobStatus::Completed | JobStatus::Failed => history.push_back(job),
            }
        }

        interrupted.sort_by_key(|job| job.enqueued_at);
        let count = interrupted.len();
        for job in interrupted.into_iter().rev() {
            pending.push_front(job);
        }

        RestoredQueue {
            pending,
            history,
            interrupted: count,
        }
    }
}

/// Atomic persistence of the queue snapshot.
pub struct QueueFile {
    path: PathBuf,
}

impl QueueFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the last snapshot. A missing file is `Ok(None)`; an unreadable
    /// one is moved aside so the scheduler can start with an empty queue.
    pub fn load(&self) -> Result<Option<QueueSnapshot>, SchedulerError> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SchedulerError::Load {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        match serde_json::from_slice::<QueueSnapshot>(&content) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                let quarantine = self.path.with_extension(format!(
                    "corrupt-{}.json",
                    Utc::now().format("%Y%m%dT%H%M%S")
                ));
                warn!(
                    "Job queue file is unreadable ({}); moving it to {}",
                    e,
                    quarantine.display()
                );
                std::fs::rename(&self.path, &quarantine).map_err(|e| SchedulerError::Load {
                    path: self.path.clone(),
                    source: e,
                })?;
                Ok(None)
            }
        }
    }

    /// Replaces the file wholesale via a temporary sibling and a rename.
    pub fn save(&self, snapshot: &QueueSnapshot) -> Result<(), SchedulerError> {
        let persist = |e| SchedulerError::Persist {
            path: self.path.clone(),
            source: e,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(persist)?;
        }

        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp).map_err(persist)?;
            file.write_all(&json).map_err(persist)?;
            file.sync_all().map_err(persist)?;
        }
        std::fs::rename(&tmp, &self.path).map_err(persist)?;

        Ok(())
    }
}

pub(crate) fn log_restored(restored: &RestoredQueue) {
    if restored.interrupted > 0 {
        warn!(
            "Re-queued {} job(s) interrupted by a previous shutdown",
            restored.interrupted
        );
    }
    info!(
        "Restored job queue: {} pending, {} in history",
        restored.pending.len(),
        restored.history.len()
    );
}
