//! Core types and traits for the job engine

pub mod cancellation;
pub mod error;
pub mod job;
pub mod kind;
pub(crate) mod progress;
pub mod task;

pub use cancellation::{CancellationReason, CancellationToken};
pub use error::{ErrorKind, JobError, Result};
pub use job::{Job, JobContext, JobId, JobInfo, JobOptions, JobStatus};
pub use kind::JobKind;
pub use task::{ClosureTask, JobTask};
