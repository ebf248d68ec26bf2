//! The behaviour a job carries
//!
//! A [`JobTask`] owns the job's payload and supplies its operations:
//! `run` on a worker thread, `cancel` as a cooperative signal, and the
//! `on_progress` / `on_finished` notifications delivered on the owner
//! thread. Collaborators (decoders, thumbnailers, scanners) implement the
//! trait once per job kind; [`ClosureTask`] covers ad-hoc jobs built from
//! closures.

use crate::core::error::{JobError, Result};
use crate::core::job::{Job, JobContext};

/// A unit of work executed by the scheduler.
///
/// `run` and `cancel` may execute concurrently for the same task (the owner
/// can cancel while a worker is running it), so any payload state they
/// share needs its own synchronization.
///
/// # Example
///
/// ```rust
/// use rust_job_engine::prelude::*;
/// use parking_lot::Mutex;
///
/// struct ThumbnailTask {
///     path: String,
///     pixels: Mutex<Option<Vec<u8>>>,
/// }
///
/// impl JobTask for ThumbnailTask {
///     fn run(&self, ctx: &JobContext) -> Result<()> {
///         let mut rows = Vec::new();
///         for row in 0..8u8 {
///             ctx.check_cancelled()?;
///             rows.push(row);
///             ctx.report_progress(f32::from(row + 1) / 8.0);
///         }
///         *self.pixels.lock() = Some(rows);
///         Ok(())
///     }
///
///     fn name(&self) -> &str {
///         "ThumbnailTask"
///     }
/// }
/// ```
pub trait JobTask: Send + Sync + 'static {
    /// Do the work. Runs on a worker thread.
    ///
    /// # Errors
    ///
    /// Any error is stored in the job and handed to the owner through the
    /// finished notification. Returning [`JobError::Cancelled`] ends the
    /// job as Canceled rather than failed.
    fn run(&self, ctx: &JobContext) -> Result<()>;

    /// Cooperative cancel signal, invoked at most once while the job runs.
    ///
    /// The job's [`CancellationToken`](crate::CancellationToken) is already
    /// tripped when this is called; override it to interrupt blocking
    /// waits the token cannot reach.
    fn cancel(&self) {}

    /// Progress notification, delivered on the owner thread.
    fn on_progress(&self, _job: &Job, _progress: f32) {}

    /// Finished notification, delivered exactly once on the owner thread.
    fn on_finished(&self, _job: &Job, _error: Option<&JobError>) {}

    /// Whether this task has a run operation at all.
    ///
    /// Jobs whose task reports `false` never enter the queue; they finish
    /// immediately with a configuration error.
    fn is_runnable(&self) -> bool {
        true
    }

    /// Get the task's name for debugging and statistics
    fn name(&self) -> &str {
        "JobTask"
    }
}

impl std::fmt::Debug for dyn JobTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobTask({})", self.name())
    }
}

type RunFn<P> = Box<dyn Fn(&P, &JobContext) -> Result<()> + Send + Sync>;
type CancelFn<P> = Box<dyn Fn(&P) + Send + Sync>;
type ProgressFn<P> = Box<dyn Fn(&P, &Job, f32) + Send + Sync>;
type FinishedFn<P> = Box<dyn Fn(&P, &Job, Option<&JobError>) + Send + Sync>;

/// A task assembled from a payload and closures.
///
/// ```rust
/// use rust_job_engine::prelude::*;
///
/// let task = ClosureTask::new(String::from("holiday/IMG_0042.jpg"))
///     .with_run(|path, ctx| {
///         ctx.check_cancelled()?;
///         assert!(path.ends_with(".jpg"));
///         Ok(())
///     })
///     .with_cancel(|path| println!("stop loading {path}"));
/// assert!(task.is_runnable());
/// ```
pub struct ClosureTask<P> {
    payload: P,
    name: String,
    run: Option<RunFn<P>>,
    cancel: Option<CancelFn<P>>,
    progress: Option<ProgressFn<P>>,
    finished: Option<FinishedFn<P>>,
}

impl<P> ClosureTask<P>
where
    P: Send + Sync + 'static,
{
    /// Create a task owning `payload`, with no operations yet
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            name: "ClosureTask".to_string(),
            run: None,
            cancel: None,
            progress: None,
            finished: None,
        }
    }

    /// Set a custom name
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Set the run operation
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_run<F>(mut self, run: F) -> Self
    where
        F: Fn(&P, &JobContext) -> Result<()> + Send + Sync + 'static,
    {
        self.run = Some(Box::new(run));
        self
    }

    /// Set the cancel operation
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_cancel<F>(mut self, cancel: F) -> Self
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.cancel = Some(Box::new(cancel));
        self
    }

    /// Set the progress callback (owner thread)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(&P, &Job, f32) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Set the finished callback (owner thread)
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_finished<F>(mut self, finished: F) -> Self
    where
        F: Fn(&P, &Job, Option<&JobError>) + Send + Sync + 'static,
    {
        self.finished = Some(Box::new(finished));
        self
    }

    /// Borrow the payload
    pub fn payload(&self) -> &P {
        &self.payload
    }
}

impl<P> JobTask for ClosureTask<P>
where
    P: Send + Sync + 'static,
{
    fn run(&self, ctx: &JobContext) -> Result<()> {
        match &self.run {
            Some(run) => run(&self.payload, ctx),
            None => Err(JobError::configuration(
                ctx.job_id().get(),
                "no run operation supplied",
            )),
        }
    }

    fn cancel(&self) {
        if let Some(cancel) = &self.cancel {
            cancel(&self.payload);
        }
    }

    fn on_progress(&self, job: &Job, progress: f32) {
        if let Some(callback) = &self.progress {
            callback(&self.payload, job, progress);
        }
    }

    fn on_finished(&self, job: &Job, error: Option<&JobError>) {
        if let Some(callback) = &self.finished {
            callback(&self.payload, job, error);
        }
    }

    fn is_runnable(&self) -> bool {
        self.run.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
