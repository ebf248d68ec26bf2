//! Worker thread implementation

use crate::core::{Job, JobContext, JobError, JobStatus, Result};
use crate::pool::scheduler::Shared;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::{debug, span, Level};

/// Statistics for a worker thread
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Jobs that finished without an error
    pub jobs_processed: AtomicU64,
    /// Jobs that finished with an error
    pub jobs_failed: AtomicU64,
    /// Jobs whose run panicked
    pub jobs_panicked: AtomicU64,
    /// Jobs that ended Canceled after starting
    pub jobs_cancelled: AtomicU64,
    /// Total time spent running jobs (microseconds)
    pub total_processing_time_us: AtomicU64,
}

impl WorkerStats {
    /// Create new worker statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment jobs processed counter
    pub fn increment_processed(&self) {
        self.jobs_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment jobs failed counter
    pub fn increment_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment jobs panicked counter
    pub fn increment_panicked(&self) {
        self.jobs_panicked.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment jobs cancelled counter
    pub fn increment_cancelled(&self) {
        self.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Add processing time
    pub fn add_processing_time(&self, microseconds: u64) {
        self.total_processing_time_us
            .fetch_add(microseconds, Ordering::Relaxed);
    }

    /// Get total jobs processed
    pub fn get_jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    /// Get total jobs failed
    pub fn get_jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Get total jobs panicked
    pub fn get_jobs_panicked(&self) -> u64 {
        self.jobs_panicked.load(Ordering::Relaxed)
    }

    /// Get total jobs cancelled while running
    pub fn get_jobs_cancelled(&self) -> u64 {
        self.jobs_cancelled.load(Ordering::Relaxed)
    }

    /// Number of runs this worker completed, whatever the outcome
    pub fn get_jobs_run(&self) -> u64 {
        self.get_jobs_processed()
            + self.get_jobs_failed()
            + self.get_jobs_panicked()
            + self.get_jobs_cancelled()
    }

    /// Get average processing time per run in microseconds
    pub fn get_average_processing_time_us(&self) -> f64 {
        let total = self.total_processing_time_us.load(Ordering::Relaxed);
        let count = self.get_jobs_run();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Copy the counters into a serializable value
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            jobs_processed: self.get_jobs_processed(),
            jobs_failed: self.get_jobs_failed(),
            jobs_panicked: self.get_jobs_panicked(),
            jobs_cancelled: self.get_jobs_cancelled(),
            total_processing_time_us: self.total_processing_time_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatsSnapshot {
    /// Jobs that finished without an error
    pub jobs_processed: u64,
    /// Jobs that finished with an error
    pub jobs_failed: u64,
    /// Jobs whose run panicked
    pub jobs_panicked: u64,
    /// Jobs that ended Canceled after starting
    pub jobs_cancelled: u64,
    /// Total time spent running jobs (microseconds)
    pub total_processing_time_us: u64,
}

/// A worker thread that takes jobs from the shared work queue
#[derive(Debug)]
pub struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn worker `id`.
    ///
    /// The worker owns slot `id` of the scheduler and exits once the
    /// scheduler's shutdown flag is set.
    pub(crate) fn new(id: usize, name_prefix: &str, shared: Arc<Shared>) -> Result<Self> {
        let stats = Arc::new(WorkerStats::new());
        let stats_clone = Arc::clone(&stats);

        let thread = thread::Builder::new()
            .name(format!("{}-{}", name_prefix, id))
            .spawn(move || {
                Self::run(id, shared, stats_clone);
            })
            .map_err(|e| JobError::spawn_with_source(id, "failed to spawn worker", e))?;

        Ok(Self {
            id,
            thread: Some(thread),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Join the worker thread
    pub fn join(mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| JobError::join(self.id, "Worker panicked"))?;
        }
        Ok(())
    }

    /// Main worker loop
    fn run(id: usize, shared: Arc<Shared>, stats: Arc<WorkerStats>) {
        #[cfg(feature = "tracing")]
        let worker_span = span!(Level::DEBUG, "worker", id = id);
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        #[cfg(feature = "tracing")]
        debug!("worker started");

        while let Some(job) = Self::next_job(id, &shared) {
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_worker_busy(id);

            Self::execute_job(id, &job, &stats);

            {
                let mut state = shared.state.lock();
                state.slots[id] = None;
                state.registry.remove(job.id());
            }
            job.post_finished();

            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_worker_idle(id);
        }

        #[cfg(feature = "tracing")]
        debug!(
            jobs_processed = stats.get_jobs_processed(),
            jobs_failed = stats.get_jobs_failed(),
            "worker shutting down"
        );
        #[cfg(not(feature = "tracing"))]
        log::debug!(
            "worker {} shutting down after {} jobs",
            id,
            stats.get_jobs_run()
        );
    }

    /// Block until a job is available and claim it, or return `None` on shutdown.
    ///
    /// Dequeue, slot assignment, registry update and the Running transition
    /// all happen under the queue lock.
    fn next_job(id: usize, shared: &Shared) -> Option<Job> {
        let mut state = shared.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            match state.queue.dequeue_highest() {
                Some(job) => {
                    if !job.try_start() {
                        // not Waiting any more; it has already been dispatched
                        state.registry.remove(job.id());
                        continue;
                    }
                    state.registry.mark_running(job.id(), id);
                    state.slots[id] = Some(job.clone());
                    return Some(job);
                }
                None => shared.work_available.wait(&mut state),
            }
        }
    }

    /// Run a single job with panic protection and record its outcome
    #[allow(unused_variables)]
    fn execute_job(id: usize, job: &Job, stats: &WorkerStats) {
        #[cfg(feature = "tracing")]
        let job_span = span!(
            Level::DEBUG,
            "job",
            job_id = job.id().get(),
            kind = job.kind().name(),
            task = job.task_name()
        );
        #[cfg(feature = "tracing")]
        let _job_guard = job_span.enter();

        let start = Instant::now();
        let ctx = JobContext::new(job.clone(), id);

        let result = match catch_unwind(AssertUnwindSafe(|| job.task().run(&ctx))) {
            Ok(result) => result,
            Err(panic_info) => {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                Err(JobError::panicked(job.id().get(), panic_msg))
            }
        };

        let elapsed = start.elapsed();
        let status = job.complete(result);

        match (status, job.error()) {
            (JobStatus::Canceled, _) => {
                stats.increment_cancelled();
                #[cfg(feature = "tracing")]
                debug!(duration_ms = elapsed.as_millis() as u64, "job canceled");
            }
            (_, None) => {
                stats.increment_processed();
                #[cfg(feature = "tracing")]
                {
                    debug!(duration_ms = elapsed.as_millis() as u64, "job completed");
                    crate::tracing::metrics::record_completion(elapsed, true);
                }
            }
            (_, Some(e)) if matches!(*e, JobError::Panicked { .. }) => {
                stats.increment_panicked();
                #[cfg(feature = "tracing")]
                {
                    tracing::error!(
                        panic_message = %e,
                        duration_ms = elapsed.as_millis() as u64,
                        "job panicked"
                    );
                    crate::tracing::metrics::record_panic(elapsed);
                }
                #[cfg(not(feature = "tracing"))]
                log::error!("worker {}: {}", id, e);
            }
            (_, Some(e)) => {
                stats.increment_failed();
                #[cfg(feature = "tracing")]
                {
                    // errors go to the owner through the finished notification
                    debug!(
                        error = %e,
                        error_kind = ?e.kind(),
                        duration_ms = elapsed.as_millis() as u64,
                        "job failed"
                    );
                    crate::tracing::metrics::record_completion(elapsed, false);
                }
                #[cfg(not(feature = "tracing"))]
                log::debug!("worker {}: job {} failed: {}", id, job.id(), e);
            }
        }

        stats.add_processing_time(elapsed.as_micros() as u64);
    }
}
