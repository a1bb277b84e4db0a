//! Persistent single-worker job queue.
//!
//! Jobs are processed strictly one at a time on a dedicated worker thread.
//! Queue state lives behind one mutex that is never held while a job runs,
//! so `enqueue` and status lookups stay responsive during long extractions.

pub mod job;
pub mod queue_file;
pub mod retry;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{ConfigError, SchedulerError};

pub use job::{
    Job, JobFailure, JobOutcome, JobPayload, JobStatus, UploadMeta, UploadTimestamp,
};
pub use queue_file::{QueueFile, QueueSnapshot};
pub use retry::RetryPolicy;

/// Does the actual work for a job. Implemented by the ingestion pipeline;
/// tests plug in stubs.
pub trait RecordingProcessor: Send + Sync {
    fn process(&self, job: &Job) -> Result<JobOutcome, JobFailure>;
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub queue_file: PathBuf,
    /// Terminal jobs kept for status lookups.
    pub history_limit: usize,
    /// Upper bound on how long the idle worker sleeps between checks.
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl SchedulerOptions {
    pub fn new<P: Into<PathBuf>>(queue_file: P) -> Self {
        Self {
            queue_file: queue_file.into(),
            history_limit: 100,
            poll_interval: Duration::from_millis(250),
            retry: RetryPolicy::None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            queue_file: config.queue_file()?,
            history_limit: config.history_limit,
            poll_interval: config.poll_interval(),
            retry: config.retry.to_policy(),
        })
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    active: HashMap<String, Job>,
    history: VecDeque<Job>,
}

impl QueueState {
    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending.iter().cloned().collect(),
            active: self
                .active
                .iter()
                .map(|(id, job)| (id.clone(), job.clone()))
                .collect::<BTreeMap<_, _>>(),
            history: self.history.iter().cloned().collect(),
            ..QueueSnapshot::default()
        }
    }

    fn find(&self, job_id: &str) -> Option<&Job> {
        self.active
            .get(job_id)
            .or_else(|| self.history.iter().rev().find(|j| j.job_id == job_id))
            .or_else(|| self.pending.iter().find(|j| j.job_id == job_id))
    }

    fn trim_history(&mut self, limit: usize) -> usize {
        let excess = self.history.len().saturating_sub(limit);
        self.history.drain(..excess);
        excess
    }
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled after every terminal transition.
    settled: Condvar,
    queue_file: QueueFile,
    options: SchedulerOptions,
    processor: Arc<dyn RecordingProcessor>,
    shutdown: AtomicBool,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Job queue lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn persist(&self, state: &QueueState) -> Result<(), SchedulerError> {
        self.queue_file.save(&state.snapshot())
    }

    fn persist_or_warn(&self, state: &QueueState) {
        if let Err(e) = self.persist(state) {
            error!("Failed to persist job queue: {}", e);
        }
    }

    fn wake(&self) {
        // A full channel already holds a pending wake-up.
        let _ = self.wake_tx.try_send(());
    }
}

pub struct JobScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobScheduler {
    /// Loads the persisted queue and prepares the scheduler. Call
    /// [`JobScheduler::start`] to begin processing.
    pub fn open(
        options: SchedulerOptions,
        processor: Arc<dyn RecordingProcessor>,
    ) -> Result<Self, SchedulerError> {
        let queue_file = QueueFile::new(&options.queue_file);

        let mut state = QueueState::default();
        if let Some(snapshot) = queue_file.load()? {
            let restored = snapshot.restore();
            queue_file::log_restored(&restored);
            state.pending = restored.pending;
            state.history = restored.history;
        }
        state.trim_history(options.history_limit);

        let (wake_tx, wake_rx) = bounded(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            settled: Condvar::new(),
            queue_file,
            options,
            processor,
            shutdown: AtomicBool::new(false),
            wake_tx,
            wake_rx,
        });

        {
            let state = shared.lock_state();
            shared.persist(&state)?;
        }

        Ok(Self {
            shared,
            worker: Mutex::new(None),
        })
    }

    /// Spawns the worker thread. Calling it again while running is a no-op.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.is_shutdown() {
            return Err(SchedulerError::ShutDown);
        }

        let mut worker = self.worker_handle();
        if worker.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("capture-ingest-worker".to_string())
            .spawn(move || run_worker(shared))
            .map_err(|e| SchedulerError::SpawnFailed(e.to_string()))?;
        *worker = Some(handle);

        info!("Job scheduler started");
        Ok(())
    }

    /// Queues a job and returns its id immediately.
    pub fn enqueue(&self, payload: JobPayload) -> Result<String, SchedulerError> {
        if self.is_shutdown() {
            return Err(SchedulerError::ShutDown);
        }
        payload.validate()?;

        let job = Job::new(payload);
        let job_id = job.job_id.clone();

        {
            let mut state = self.shared.lock_state();
            state.pending.push_back(job);
            if let Err(e) = self.shared.persist(&state) {
                state.pending.pop_back();
                return Err(e);
            }
            debug!(
                "Enqueued job {} ({} pending)",
                job_id,
                state.pending.len()
            );
        }

        self.shared.wake();
        Ok(job_id)
    }

    /// Looks the job up in the active set, then history, then the pending
    /// queue.
    pub fn get_status(&self, job_id: &str) -> Option<Job> {
        self.shared.lock_state().find(job_id).cloned()
    }

    /// Drops the oldest terminal jobs beyond the history limit. Returns how
    /// many were removed.
    pub fn cleanup(&self) -> Result<usize, SchedulerError> {
        let mut state = self.shared.lock_state();
        let removed = state.trim_history(self.shared.options.history_limit);
        self.shared.persist(&state)?;
        if removed > 0 {
            info!("Trimmed {} job(s) from history", removed);
        }
        Ok(removed)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock_state().pending.len()
    }

    /// Every known job: running first, then queued, then history newest
    /// first.
    pub fn jobs(&self) -> Vec<Job> {
        let state = self.shared.lock_state();
        state
            .active
            .values()
            .chain(state.pending.iter())
            .chain(state.history.iter().rev())
            .cloned()
            .collect()
    }

    /// Blocks until `job_id` reaches a terminal state or `timeout` elapses.
    /// Returns the job's last known state; `None` if it is unknown.
    pub fn wait_for_terminal(&self, job_id: &str, timeout: Duration) -> Option<Job> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock_state();

        loop {
            let job = state.find(job_id)?.clone();
            let now = Instant::now();
            if job.status.is_terminal() || now >= deadline || self.is_shutdown() {
                return Some(job);
            }

            state = match self.shared.settled.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => {
                    warn!("Job queue lock was poisoned, recovering");
                    poisoned.into_inner().0
                }
            };
        }
    }

    /// Asks the worker to stop after the job it is running, if any.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.swap(true, Ordering::SeqCst) {
            info!("Shutting down job scheduler...");
        }
        self.shared.wake();
        self.shared.settled.notify_all();
    }

    /// Waits for the worker thread to exit. Call after
    /// [`JobScheduler::shutdown`].
    pub fn wait(&self) {
        let handle = self.worker_handle().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.join() {
                error!("Worker thread panicked: {:?}", e);
            } else {
                debug!("Worker thread finished");
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    fn worker_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown();
        self.wait();
    }
}

fn run_worker(shared: Arc<Shared>) {
    debug!("Worker started");

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            debug!("Worker received shutdown signal");
            break;
        }

        if let Some(job) = claim_next(&shared) {
            process_job(&shared, job);
            thread::yield_now();
            continue;
        }

        match shared.wake_rx.recv_timeout(idle_timeout(&shared)) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Worker stopped");
}

/// Moves the first runnable pending job into the active set.
fn claim_next(shared: &Shared) -> Option<Job> {
    let mut state = shared.lock_state();
    let now = Utc::now();

    let index = state.pending.iter().position(|job| job.is_ready(now))?;
    let mut job = state.pending.remove(index)?;
    job.mark_processing(now);
    state.active.insert(job.job_id.clone(), job.clone());
    shared.persist_or_warn(&state);

    Some(job)
}

/// Sleeps no longer than the poll interval, and no longer than the wait
/// for the earliest scheduled retry.
fn idle_timeout(shared: &Shared) -> Duration {
    let poll = shared.options.poll_interval;
    let state = shared.lock_state();
    let now = Utc::now();

    state
        .pending
        .iter()
        .filter_map(|job| job.next_attempt_at)
        .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
        .min()
        .map(|until_retry| until_retry.clamp(Duration::from_millis(1), poll))
        .unwrap_or(poll)
}

fn process_job(shared: &Shared, job: Job) {
    info!(
        "Processing job {} for recording {} (attempt {})",
        job.job_id, job.recording_id, job.attempts
    );

    let result = match panic::catch_unwind(AssertUnwindSafe(|| shared.processor.process(&job))) {
        Ok(result) => result,
        Err(payload) => Err(JobFailure::fatal(format!(
            "Processing panicked: {}",
            panic_message(payload.as_ref())
        ))),
    };

    let mut state = shared.lock_state();
    let now = Utc::now();
    let mut job = state.active.remove(&job.job_id).unwrap_or(job);

    match result {
        Ok(outcome) => {
            info!(
                "Job {} completed: {} events, {} thumbnails",
                job.job_id, outcome.event_count, outcome.thumbnail_count
            );
            job.mark_completed(outcome, now);
            state.history.push_back(job);
        }
        Err(failure) => match shared
            .options
            .retry
            .next_delay(job.attempts, failure.retryable)
        {
            Some(delay) => {
                warn!(
                    "Job {} failed (attempt {}), retrying in {:?}: {}",
                    job.job_id, job.attempts, delay, failure.message
                );
                let at = now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                job.schedule_retry(failure.message, at);
                state.pending.push_front(job);
            }
            None => {
                error!("Job {} failed: {}", job.job_id, failure.message);
                job.mark_failed(failure.message, now);
                state.history.push_back(job);
            }
        },
    }

    state.trim_history(shared.options.history_limit);
    shared.persist_or_warn(&state);
    drop(state);

    shared.settled.notify_all();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
