//! Convenient re-exports for common types and traits

pub use crate::core::{
    CancellationToken, ClosureTask, ErrorKind, Job, JobContext, JobError, JobId, JobKind,
    JobOptions, JobStatus, JobTask, Result,
};
pub use crate::dispatch::{Dispatcher, MainLoop, MainLoopHandle};
pub use crate::pool::{Scheduler, SchedulerConfig, SchedulerStats, WorkerStats};
pub use crate::queue::JobLocation;
