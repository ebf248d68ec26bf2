//! Job handles, status and the run context

use crate::core::cancellation::{CancellationReason, CancellationToken};
use crate::core::error::{JobError, Result};
use crate::core::kind::JobKind;
use crate::core::progress::ProgressTracker;
use crate::core::task::JobTask;
use crate::dispatch::Dispatcher;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique job identifier. Zero is never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn next() -> Self {
        loop {
            let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return JobId(id);
            }
        }
    }

    /// The raw id value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a job
///
/// Transitions are `Waiting -> Running -> {Finished, Canceled}` and
/// `Waiting -> {Finished, Canceled}`. A failed job is `Finished` with an
/// error attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Submitted, not yet picked up by a worker
    Waiting,
    /// Owned by a worker slot
    Running,
    /// Run returned (successfully or with an error)
    Finished,
    /// Cancelled before or during its run
    Canceled,
}

impl JobStatus {
    /// Whether the status can no longer change.
    ///
    /// A Running job that is cancelled turns `Canceled` at once, while its
    /// run may still be returning. The finished notification is the signal
    /// that the run is over and the job released.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Canceled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

/// Per-submission options
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub(crate) urgent: bool,
    pub(crate) progress_threshold: Option<f32>,
    pub(crate) progress_parts: u32,
}

impl JobOptions {
    /// Default options: FIFO placement, scheduler-wide progress threshold, one part
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the job at the front of its kind's partition
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    /// Minimum progress step between two progress notifications
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_progress_threshold(mut self, threshold: f32) -> Self {
        self.progress_threshold = Some(threshold);
        self
    }

    /// Split progress into `parts` equal segments
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_progress_parts(mut self, parts: u32) -> Self {
        self.progress_parts = parts;
        self
    }

    /// Reject a per-job threshold outside `[0, 1]` (NaN included)
    pub fn validate(&self) -> Result<()> {
        match self.progress_threshold {
            Some(threshold) if !(0.0..=1.0).contains(&threshold) => Err(JobError::invalid_config(
                "progress_threshold",
                format!("{} is outside [0, 1]", threshold),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    error: Option<Arc<JobError>>,
    progress: ProgressTracker,
    finished_posted: bool,
    finished_delivered: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

struct JobInner {
    id: JobId,
    kind: JobKind,
    urgent: bool,
    task: Box<dyn JobTask>,
    token: CancellationToken,
    state: Mutex<JobState>,
    dispatcher: Arc<dyn Dispatcher>,
    submitted_at: DateTime<Utc>,
}

/// Shared handle to a submitted job.
///
/// Cloning is cheap; the owner and the scheduler each hold a handle, and the
/// task (with its payload) is dropped when the last one goes away.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("task", &self.inner.task.name())
            .field("status", &self.status())
            .finish()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Job {}

impl Job {
    pub(crate) fn new(
        kind: JobKind,
        task: Box<dyn JobTask>,
        options: &JobOptions,
        default_threshold: f32,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        let id = JobId::next();
        let threshold = options.progress_threshold.unwrap_or(default_threshold);
        Self {
            inner: Arc::new(JobInner {
                id,
                kind,
                urgent: options.urgent,
                task,
                token: CancellationToken::for_job(id.get()),
                state: Mutex::new(JobState {
                    status: JobStatus::Waiting,
                    error: None,
                    progress: ProgressTracker::new(threshold, options.progress_parts),
                    finished_posted: false,
                    finished_delivered: false,
                    started_at: None,
                    finished_at: None,
                }),
                dispatcher,
                submitted_at: Utc::now(),
            }),
        }
    }

    /// Job identifier
    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// Job kind
    pub fn kind(&self) -> JobKind {
        self.inner.kind
    }

    /// Current status
    pub fn status(&self) -> JobStatus {
        self.inner.state.lock().status
    }

    /// `true` once the job is Finished without an error
    pub fn succeeded(&self) -> bool {
        let state = self.inner.state.lock();
        state.status == JobStatus::Finished && state.error.is_none()
    }

    /// Latest stored progress in `[0, 1]`
    pub fn progress(&self) -> f32 {
        self.inner.state.lock().progress.value()
    }

    /// The error the run ended with, if any
    pub fn error(&self) -> Option<Arc<JobError>> {
        self.inner.state.lock().error.clone()
    }

    /// Whether the job was submitted at the front of its partition
    pub fn is_urgent(&self) -> bool {
        self.inner.urgent
    }

    /// Name of the task this job carries
    pub fn task_name(&self) -> &str {
        self.inner.task.name()
    }

    /// Serializable snapshot of the job
    pub fn info(&self) -> JobInfo {
        let state = self.inner.state.lock();
        JobInfo {
            id: self.inner.id,
            kind: self.inner.kind,
            task: self.inner.task.name().to_string(),
            status: state.status,
            progress: state.progress.value(),
            urgent: self.inner.urgent,
            error: state.error.as_ref().map(|e| e.to_string()),
            submitted_at: self.inner.submitted_at,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    pub(crate) fn task(&self) -> &dyn JobTask {
        self.inner.task.as_ref()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Waiting -> Running. Caller holds the queue lock.
    pub(crate) fn try_start(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.status != JobStatus::Waiting {
            return false;
        }
        state.status = JobStatus::Running;
        state.started_at = Some(Utc::now());
        true
    }

    /// Waiting -> Canceled, for jobs already unlinked from the queue.
    ///
    /// The task's cancel operation is not invoked: nothing is running.
    pub(crate) fn cancel_waiting(&self, reason: CancellationReason) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.status != JobStatus::Waiting {
                return false;
            }
            state.status = JobStatus::Canceled;
            state.finished_at = Some(Utc::now());
        }
        self.inner.token.cancel_with_reason(reason);
        true
    }

    /// Running -> Canceled, then signal the run operation.
    ///
    /// Returns the status after the call. The token is tripped and the
    /// task's cancel operation runs outside the job lock, at most once.
    pub(crate) fn cancel_running(&self, reason: CancellationReason) -> JobStatus {
        {
            let mut state = self.inner.state.lock();
            if state.status != JobStatus::Running {
                return state.status;
            }
            state.status = JobStatus::Canceled;
        }
        self.inner.token.cancel_with_reason(reason);
        self.inner.task.cancel();
        JobStatus::Canceled
    }

    /// Waiting -> Finished with a configuration error
    pub(crate) fn reject(&self, error: JobError) {
        let mut state = self.inner.state.lock();
        if state.status == JobStatus::Waiting {
            state.status = JobStatus::Finished;
            state.error = Some(Arc::new(error));
            state.finished_at = Some(Utc::now());
        }
    }

    /// Record the outcome of the run. A job cancelled meanwhile stays Canceled.
    pub(crate) fn complete(&self, result: Result<()>) -> JobStatus {
        let mut state = self.inner.state.lock();
        state.finished_at = Some(Utc::now());
        if state.status == JobStatus::Canceled {
            return JobStatus::Canceled;
        }
        match result {
            Ok(()) => state.status = JobStatus::Finished,
            Err(e) if e.is_cancelled() => state.status = JobStatus::Canceled,
            Err(e) => {
                state.status = JobStatus::Finished;
                state.error = Some(Arc::new(e));
            }
        }
        state.status
    }

    /// Hand the finished notification to the owner thread. Idempotent.
    pub(crate) fn post_finished(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.finished_posted {
                return;
            }
            state.finished_posted = true;
        }
        let job = self.clone();
        if let Err(e) = self
            .inner
            .dispatcher
            .post(Box::new(move || job.deliver_finished()))
        {
            #[cfg(feature = "tracing")]
            tracing::warn!(job_id = self.inner.id.get(), error = %e, "finished notification dropped");
            #[cfg(not(feature = "tracing"))]
            log::warn!("job {}: finished notification dropped: {}", self.inner.id, e);
        }
    }

    fn report_progress(&self, progress: f32) {
        let schedule = {
            let mut state = self.inner.state.lock();
            state.status == JobStatus::Running && state.progress.update(progress)
        };
        if !schedule {
            return;
        }

        let job = self.clone();
        if let Err(e) = self
            .inner
            .dispatcher
            .post(Box::new(move || job.deliver_progress()))
        {
            // clear the pending flag so a later report may try again
            self.inner.state.lock().progress.take();
            #[cfg(feature = "tracing")]
            tracing::debug!(job_id = self.inner.id.get(), error = %e, "progress notification dropped");
            #[cfg(not(feature = "tracing"))]
            log::debug!("job {}: progress notification dropped: {}", self.inner.id, e);
        }
    }

    fn part_finished(&self) {
        self.inner.state.lock().progress.part_finished();
    }

    fn deliver_progress(&self) {
        let value = {
            let mut state = self.inner.state.lock();
            let value = state.progress.take();
            if state.finished_delivered {
                return;
            }
            value
        };
        self.inner.task.on_progress(self, value);
    }

    fn deliver_finished(&self) {
        let error = {
            let mut state = self.inner.state.lock();
            if state.finished_delivered {
                return;
            }
            state.finished_delivered = true;
            state.error.clone()
        };
        self.inner.task.on_finished(self, error.as_deref());
    }
}

/// Serializable point-in-time view of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job identifier
    pub id: JobId,
    /// Job kind
    pub kind: JobKind,
    /// Task name
    pub task: String,
    /// Status at snapshot time
    pub status: JobStatus,
    /// Progress at snapshot time
    pub progress: f32,
    /// Submitted at the front of its partition
    pub urgent: bool,
    /// Rendered error, if the job failed
    pub error: Option<String>,
    /// When the job was created
    pub submitted_at: DateTime<Utc>,
    /// When a worker picked it up
    pub started_at: Option<DateTime<Utc>>,
    /// When it reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
}

/// What a task's run operation sees of its job.
///
/// Only the worker executing the run receives a context, so progress can
/// only be reported from there.
pub struct JobContext {
    job: Job,
    worker_id: usize,
}

impl JobContext {
    pub(crate) fn new(job: Job, worker_id: usize) -> Self {
        Self { job, worker_id }
    }

    /// Id of the running job
    pub fn job_id(&self) -> JobId {
        self.job.id()
    }

    /// Kind of the running job
    pub fn kind(&self) -> JobKind {
        self.job.kind()
    }

    /// Index of the worker executing the run
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Whether cancellation was requested
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.job.token().is_cancelled()
    }

    /// `Err(JobError::Cancelled)` once cancellation was requested
    pub fn check_cancelled(&self) -> Result<()> {
        self.job.token().check()
    }

    /// The job's cancellation token
    pub fn token(&self) -> &CancellationToken {
        self.job.token()
    }

    /// Store progress for the current part; notifications are coalesced
    pub fn report_progress(&self, progress: f32) {
        self.job.report_progress(progress);
    }

    /// Move on to the next progress part
    pub fn part_finished(&self) {
        self.job.part_finished();
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job.id())
            .field("worker_id", &self.worker_id)
            .finish()
    }
}
