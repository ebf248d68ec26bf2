//! The job scheduler: queue, worker pool and cancellation

use crate::core::{
    CancellationReason, ClosureTask, Job, JobContext, JobError, JobId, JobKind, JobOptions,
    JobStatus, JobTask, Result,
};
use crate::dispatch::Dispatcher;
use crate::pool::config::SchedulerConfig;
use crate::pool::worker::{Worker, WorkerStats, WorkerStatsSnapshot};
use crate::queue::{JobLocation, Registry, WorkQueue};
use crate::tracing::TracedTask;
use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Everything guarded by the queue lock
#[derive(Debug)]
pub(crate) struct SchedulerState {
    pub(crate) queue: WorkQueue,
    pub(crate) registry: Registry,
    /// One entry per worker; `Some` while that worker runs a job
    pub(crate) slots: Vec<Option<Job>>,
    pub(crate) shutdown: bool,
}

/// State shared between the scheduler handle and its workers
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: Mutex<SchedulerState>,
    pub(crate) work_available: Condvar,
}

/// Serializable scheduler statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Scheduler name
    pub name: String,
    /// Configured worker count
    pub num_workers: usize,
    /// Whether the scheduler accepts submissions
    pub running: bool,
    /// Jobs accepted since creation
    pub total_submitted: u64,
    /// Jobs waiting, over all kinds
    pub queued: usize,
    /// Waiting jobs per kind, highest priority first
    pub queued_by_kind: Vec<(JobKind, usize)>,
    /// Jobs currently held by a worker
    pub running_jobs: usize,
    /// Per-worker counters
    pub workers: Vec<WorkerStatsSnapshot>,
}

impl SchedulerStats {
    /// Jobs that finished without an error, over all workers
    pub fn total_processed(&self) -> u64 {
        self.workers.iter().map(|w| w.jobs_processed).sum()
    }

    /// Jobs that finished with an error (panics excluded), over all workers
    pub fn total_failed(&self) -> u64 {
        self.workers.iter().map(|w| w.jobs_failed).sum()
    }

    /// Jobs whose run panicked, over all workers
    pub fn total_panicked(&self) -> u64 {
        self.workers.iter().map(|w| w.jobs_panicked).sum()
    }

    /// Jobs canceled while running, over all workers
    pub fn total_cancelled(&self) -> u64 {
        self.workers.iter().map(|w| w.jobs_cancelled).sum()
    }
}

/// Background job scheduler.
///
/// Jobs wait in a kind-partitioned queue and run on a fixed set of worker
/// threads. Progress and finished notifications are posted to the
/// [`Dispatcher`] and therefore run on the owner thread. Independent
/// schedulers can coexist in one process.
///
/// # Example
///
/// ```rust
/// use rust_job_engine::prelude::*;
/// use std::time::Duration;
///
/// # fn main() -> Result<()> {
/// let main_loop = MainLoop::new();
/// let scheduler = Scheduler::new(main_loop.handle())?;
/// scheduler.start()?;
///
/// let job = scheduler.execute(JobKind::Load, "IMG_0001.jpg".to_string(), |path, ctx| {
///     ctx.report_progress(0.5);
///     assert!(path.ends_with(".jpg"));
///     Ok(())
/// })?;
///
/// main_loop.run_until(|| job.status().is_terminal(), Duration::from_secs(5));
/// assert!(job.succeeded());
///
/// scheduler.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    shared: Arc<Shared>,
    dispatcher: Arc<dyn Dispatcher>,
    workers: RwLock<Vec<Worker>>,
    running: AtomicBool,
    /// Held for the whole of `start` and `shutdown`; a restart waits until
    /// the previous workers are joined
    lifecycle: Mutex<()>,
    total_jobs_submitted: AtomicU64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("running", &self.running.load(Ordering::Relaxed))
            .field(
                "total_jobs_submitted",
                &self.total_jobs_submitted.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler with the default configuration
    pub fn new<D>(dispatcher: D) -> Result<Self>
    where
        D: Dispatcher + 'static,
    {
        Self::with_config(SchedulerConfig::default(), dispatcher)
    }

    /// Create a scheduler with a custom configuration
    pub fn with_config<D>(config: SchedulerConfig, dispatcher: D) -> Result<Self>
    where
        D: Dispatcher + 'static,
    {
        config.validate()?;

        Ok(Self {
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState {
                    queue: WorkQueue::new(),
                    registry: Registry::new(),
                    slots: Vec::new(),
                    shutdown: true,
                }),
                work_available: Condvar::new(),
            }),
            dispatcher: Arc::new(dispatcher),
            workers: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            total_jobs_submitted: AtomicU64::new(0),
        })
    }

    /// Spawn the workers.
    ///
    /// A scheduler can be started again after [`shutdown`](Self::shutdown).
    /// A call made while a shutdown is in progress blocks until that
    /// shutdown has joined its workers.
    pub fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(JobError::already_running(
                &self.config.name,
                self.config.num_workers,
            ));
        }

        {
            let mut state = self.shared.state.lock();
            state.shutdown = false;
            state.slots = vec![None; self.config.num_workers];
        }

        let mut workers = Vec::with_capacity(self.config.num_workers);
        for id in 0..self.config.num_workers {
            match Worker::new(
                id,
                &self.config.thread_name_prefix,
                Arc::clone(&self.shared),
            ) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    self.shared.state.lock().shutdown = true;
                    self.shared.work_available.notify_all();
                    for worker in workers {
                        // the spawn error is the one worth reporting
                        let _ = worker.join();
                    }
                    self.running.store(false, Ordering::Release);
                    return Err(e);
                }
            }
        }

        *self.workers.write() = workers;

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_scheduler_start(&self.config.name, self.config.num_workers);
        #[cfg(not(feature = "tracing"))]
        log::info!(
            "scheduler '{}' started with {} workers",
            self.config.name,
            self.config.num_workers
        );

        Ok(())
    }

    /// Submit a job with default options.
    ///
    /// Fails only if the scheduler is not running. A task without a run
    /// operation is accepted but immediately Finished with a configuration
    /// error; it never enters the queue.
    pub fn submit<T: JobTask>(&self, kind: JobKind, task: T) -> Result<Job> {
        self.submit_with_options(kind, task, JobOptions::new())
    }

    /// Submit a job with explicit options
    pub fn submit_with_options<T: JobTask>(
        &self,
        kind: JobKind,
        task: T,
        options: JobOptions,
    ) -> Result<Job> {
        self.submit_boxed(kind, Box::new(task), options)
    }

    /// Submit a job that runs inside the caller's current tracing span
    pub fn submit_traced<T: JobTask>(&self, kind: JobKind, task: T) -> Result<Job> {
        self.submit(kind, TracedTask::new(task))
    }

    /// Submit a closure-backed job
    pub fn execute<P, F>(&self, kind: JobKind, payload: P, run: F) -> Result<Job>
    where
        P: Send + Sync + 'static,
        F: Fn(&P, &JobContext) -> Result<()> + Send + Sync + 'static,
    {
        self.submit(kind, ClosureTask::new(payload).with_run(run))
    }

    fn submit_boxed(
        &self,
        kind: JobKind,
        task: Box<dyn JobTask>,
        options: JobOptions,
    ) -> Result<Job> {
        if !self.is_running() {
            return Err(JobError::not_running(&self.config.name));
        }
        options.validate()?;

        let job = Job::new(
            kind,
            task,
            &options,
            self.config.progress_threshold,
            Arc::clone(&self.dispatcher),
        );

        if !job.task().is_runnable() {
            job.reject(JobError::configuration(
                job.id().get(),
                "no run operation supplied",
            ));
            job.post_finished();
            self.total_jobs_submitted.fetch_add(1, Ordering::Relaxed);
            return Ok(job);
        }

        #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
        let queue_depth = {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return Err(JobError::not_running(&self.config.name));
            }
            state.registry.mark_queued(job.id(), kind);
            state.queue.push(job.clone());
            state.queue.len()
        };
        self.shared.work_available.notify_one();
        self.total_jobs_submitted.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_submission(kind, queue_depth);

        Ok(job)
    }

    /// Request cancellation of a live job.
    ///
    /// A Waiting job is unlinked from the queue, becomes Canceled and has its
    /// finished notification dispatched without ever running. A Running job
    /// becomes Canceled and its task's cancel operation is invoked; the call
    /// does not wait for the run to return.
    ///
    /// Returns the job's status after the request, or `None` if no live job
    /// has this id. Terminal jobs are released from the registry once their
    /// worker lets go of them, so `None` also covers a job that already ended;
    /// use [`cancel`](Self::cancel) to get its terminal status instead.
    pub fn request_cancel(&self, id: JobId) -> Option<JobStatus> {
        self.cancel_with_reason(id, CancellationReason::Requested)
    }

    /// Cancel through a job handle.
    ///
    /// Like [`request_cancel`](Self::request_cancel), but a job that already
    /// ended reports its terminal status and nothing is re-dispatched.
    pub fn cancel(&self, job: &Job) -> JobStatus {
        self.request_cancel(job.id())
            .unwrap_or_else(|| job.status())
    }

    fn cancel_with_reason(&self, id: JobId, reason: CancellationReason) -> Option<JobStatus> {
        let mut state = self.shared.state.lock();
        match state.registry.get(id)? {
            JobLocation::Queued(kind) => {
                state.registry.remove(id);
                let job = state.queue.remove(id, kind)?;
                job.cancel_waiting(reason);
                drop(state);

                job.post_finished();
                #[cfg(feature = "tracing")]
                crate::tracing::metrics::record_cancel(id, false);
                Some(JobStatus::Canceled)
            }
            JobLocation::Running { worker } => {
                let job = state.slots.get(worker).and_then(|slot| slot.clone())?;
                drop(state);

                let status = job.cancel_running(reason);
                #[cfg(feature = "tracing")]
                crate::tracing::metrics::record_cancel(id, true);
                Some(status)
            }
        }
    }

    /// Cancel every Waiting and Running job; the scheduler keeps running.
    ///
    /// Returns the number of jobs cancelled.
    pub fn cancel_all(&self) -> usize {
        let (waiting, running) = {
            let mut state = self.shared.state.lock();
            let waiting = state.queue.drain();
            for job in &waiting {
                state.registry.remove(job.id());
                job.cancel_waiting(CancellationReason::Requested);
            }
            let running: Vec<Job> = state.slots.iter().flatten().cloned().collect();
            (waiting, running)
        };

        for job in &waiting {
            job.post_finished();
        }
        let cancelled_running = running
            .iter()
            .filter(|job| job.cancel_running(CancellationReason::Requested) == JobStatus::Canceled)
            .count();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            waiting = waiting.len(),
            running = cancelled_running,
            "cancelled all jobs"
        );

        waiting.len() + cancelled_running
    }

    /// Handle of a live (Waiting or Running) job
    pub fn get_job(&self, id: JobId) -> Option<Job> {
        let state = self.shared.state.lock();
        match state.registry.get(id)? {
            JobLocation::Queued(kind) => state.queue.find(id, kind).cloned(),
            JobLocation::Running { worker } => state.slots.get(worker).and_then(|s| s.clone()),
        }
    }

    /// Where a live job currently is
    pub fn location(&self, id: JobId) -> Option<JobLocation> {
        self.shared.state.lock().registry.get(id)
    }

    /// Number of Waiting jobs
    pub fn queued_len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Number of Waiting jobs of one kind
    pub fn queued_len_for(&self, kind: JobKind) -> usize {
        self.shared.state.lock().queue.len_for(kind)
    }

    /// Number of jobs held by workers
    pub fn running_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .slots
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    /// Get the number of worker threads
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Check if the scheduler is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get total number of jobs submitted
    pub fn total_jobs_submitted(&self) -> u64 {
        self.total_jobs_submitted.load(Ordering::Relaxed)
    }

    /// The configuration this scheduler was built with
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Get statistics for all workers of the current run
    pub fn worker_stats(&self) -> Vec<Arc<WorkerStats>> {
        self.workers.read().iter().map(|w| w.stats()).collect()
    }

    /// Snapshot of queue depth, running jobs and worker counters
    pub fn stats(&self) -> SchedulerStats {
        let (queued, queued_by_kind, running_jobs) = {
            let state = self.shared.state.lock();
            let by_kind = JobKind::PRIORITY_ORDER
                .iter()
                .map(|&kind| (kind, state.queue.len_for(kind)))
                .collect();
            let running = state.slots.iter().filter(|slot| slot.is_some()).count();
            (state.queue.len(), by_kind, running)
        };

        SchedulerStats {
            name: self.config.name.clone(),
            num_workers: self.config.num_workers,
            running: self.is_running(),
            total_submitted: self.total_jobs_submitted(),
            queued,
            queued_by_kind,
            running_jobs,
            workers: self
                .workers
                .read()
                .iter()
                .map(|w| w.stats().snapshot())
                .collect(),
        }
    }

    /// Stop the scheduler and wait for the workers to exit.
    ///
    /// 1. Stops accepting new jobs
    /// 2. Cancels every Waiting job and dispatches its finished notification
    /// 3. Invokes cancel on every Running job
    /// 4. Joins the workers once their in-flight runs return
    ///
    /// This is the one operation that blocks the owner thread. Calling it on
    /// a stopped scheduler does nothing.
    pub fn shutdown(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let (drained, in_flight) = {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            let drained = state.queue.drain();
            for job in &drained {
                state.registry.remove(job.id());
                job.cancel_waiting(CancellationReason::Shutdown);
            }
            let in_flight: Vec<Job> = state.slots.iter().flatten().cloned().collect();
            (drained, in_flight)
        };
        self.shared.work_available.notify_all();

        for job in &drained {
            job.post_finished();
        }
        for job in &in_flight {
            job.cancel_running(CancellationReason::Shutdown);
        }

        let workers = std::mem::take(&mut *self.workers.write());
        let worker_stats: Vec<Arc<WorkerStats>> = workers.iter().map(|w| w.stats()).collect();
        let mut first_error = None;
        for worker in workers {
            if let Err(e) = worker.join() {
                first_error.get_or_insert(e);
            }
        }
        let processed: u64 = worker_stats.iter().map(|s| s.get_jobs_processed()).sum();

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_scheduler_shutdown(
            &self.config.name,
            drained.len(),
            processed,
            worker_stats.iter().map(|s| s.get_jobs_failed()).sum(),
        );
        #[cfg(not(feature = "tracing"))]
        log::info!(
            "scheduler '{}' shut down: {} waiting jobs canceled, {} processed",
            self.config.name,
            drained.len(),
            processed
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.running.load(Ordering::Acquire) {
            if let Err(e) = self.shutdown() {
                #[cfg(feature = "tracing")]
                tracing::error!(scheduler = %self.config.name, error = %e, "shutdown during drop failed");
                #[cfg(not(feature = "tracing"))]
                log::error!(
                    "failed to shut down scheduler '{}' during drop: {}",
                    self.config.name,
                    e
                );
            }
        }
    }
}
