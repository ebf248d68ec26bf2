//! Tracing integration for observability.
//!
//! Workers open a `worker` span for their lifetime and a `job` span around
//! every run (with `job_id`, `kind` and `task` fields). The [`metrics`]
//! helpers emit counter/gauge style events, and [`TracedTask`] carries the
//! submitter's span into the worker thread.
//!
//! # Example
//!
//! ```rust,ignore
//! use rust_job_engine::prelude::*;
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env()
//!         .add_directive("rust_job_engine=debug".parse().unwrap()))
//!     .init();
//!
//! let span = tracing::info_span!("open_folder", path = "/photos/2024");
//! let _enter = span.enter();
//! scheduler.submit_traced(JobKind::DirectoryScan, ScanTask::new("/photos/2024"))?;
//! ```

use crate::core::{Job, JobContext, JobError, JobTask, Result};

/// A task wrapper that propagates tracing context across thread boundaries.
///
/// The current span is captured when the wrapper is created and entered
/// while the task runs on a worker, so events from the run nest under the
/// code that submitted it.
pub struct TracedTask<T: JobTask> {
    inner: T,
    #[cfg(feature = "tracing")]
    span: tracing::Span,
}

impl<T: JobTask> TracedTask<T> {
    /// Wrap `task`, capturing the current span.
    pub fn new(task: T) -> Self {
        Self {
            inner: task,
            #[cfg(feature = "tracing")]
            span: tracing::Span::current(),
        }
    }

    /// Wrap `task` with a specific span.
    #[cfg(feature = "tracing")]
    pub fn with_span(task: T, span: tracing::Span) -> Self {
        Self { inner: task, span }
    }

    /// The wrapped task
    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: JobTask> JobTask for TracedTask<T> {
    fn run(&self, ctx: &JobContext) -> Result<()> {
        #[cfg(feature = "tracing")]
        let _guard = self.span.enter();
        self.inner.run(ctx)
    }

    fn cancel(&self) {
        self.inner.cancel();
    }

    fn on_progress(&self, job: &Job, progress: f32) {
        self.inner.on_progress(job, progress);
    }

    fn on_finished(&self, job: &Job, error: Option<&JobError>) {
        self.inner.on_finished(job, error);
    }

    fn is_runnable(&self) -> bool {
        self.inner.is_runnable()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Metrics recording functions for observability.
///
/// These functions emit tracing events that can be consumed by
/// metrics collection systems like Prometheus via tracing-opentelemetry.
#[cfg(feature = "tracing")]
pub mod metrics {
    use crate::core::{JobId, JobKind};
    use std::time::Duration;

    /// Records a job submission event.
    #[inline]
    pub fn record_submission(kind: JobKind, queue_depth: usize) {
        tracing::trace!(
            counter.jobs_submitted = 1,
            gauge.queue_depth = queue_depth as i64,
            kind = kind.name(),
            "job submitted"
        );
    }

    /// Records job completion with timing.
    #[inline]
    pub fn record_completion(duration: Duration, success: bool) {
        let duration_ms = duration.as_millis() as u64;
        if success {
            tracing::trace!(
                counter.jobs_completed = 1,
                histogram.job_duration_ms = duration_ms,
                "job completed successfully"
            );
        } else {
            tracing::trace!(
                counter.jobs_failed = 1,
                histogram.job_duration_ms = duration_ms,
                "job failed"
            );
        }
    }

    /// Records a job panic event.
    #[inline]
    pub fn record_panic(duration: Duration) {
        tracing::trace!(
            counter.jobs_panicked = 1,
            histogram.job_duration_ms = duration.as_millis() as u64,
            "job panicked"
        );
    }

    /// Records a cancellation request.
    #[inline]
    pub fn record_cancel(job_id: JobId, was_running: bool) {
        tracing::trace!(
            counter.jobs_cancelled = 1,
            job_id = job_id.get(),
            was_running = was_running,
            "job cancel requested"
        );
    }

    /// Records worker becoming busy.
    #[inline]
    pub fn record_worker_busy(worker_id: usize) {
        tracing::trace!(
            gauge.workers_busy = 1,
            worker_id = worker_id,
            "worker busy"
        );
    }

    /// Records worker becoming idle.
    #[inline]
    pub fn record_worker_idle(worker_id: usize) {
        tracing::trace!(
            gauge.workers_busy = -1i64,
            worker_id = worker_id,
            "worker idle"
        );
    }

    /// Records scheduler startup.
    #[inline]
    pub fn record_scheduler_start(name: &str, num_workers: usize) {
        tracing::info!(
            scheduler = name,
            workers = num_workers,
            "scheduler started"
        );
    }

    /// Records scheduler shutdown.
    #[inline]
    pub fn record_scheduler_shutdown(
        name: &str,
        waiting_cancelled: usize,
        jobs_processed: u64,
        jobs_failed: u64,
    ) {
        tracing::info!(
            scheduler = name,
            waiting_cancelled = waiting_cancelled,
            jobs_processed = jobs_processed,
            jobs_failed = jobs_failed,
            "scheduler shutdown complete"
        );
    }
}
