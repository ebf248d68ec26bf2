//! # Rust Job Engine
//!
//! Background job execution for image viewers and similar interactive
//! applications: decode, thumbnail, transform, scan and save work runs on a
//! small fixed pool of worker threads while every notification reaches the
//! application on its own (owner) thread.
//!
//! ## Features
//!
//! - **Kind priorities**: jobs wait in per-kind FIFO partitions served in the
//!   order Load, Transform, DirectoryScan, Thumbnail, Save
//! - **Fixed worker pool**: `N` persistent workers, no per-job threads
//! - **Cooperative cancellation**: waiting jobs are unlinked and never run;
//!   running jobs see their [`CancellationToken`] trip
//! - **Owner-thread dispatch**: progress and finished callbacks are posted
//!   through a [`Dispatcher`]; progress is coalesced
//! - **Panic isolation**: a panicking job finishes with an error, the worker
//!   survives
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_job_engine::prelude::*;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let main_loop = MainLoop::new();
//! let scheduler = Scheduler::new(main_loop.handle())?;
//! scheduler.start()?;
//!
//! let thumbnails: Vec<Job> = (0..4)
//!     .map(|i| {
//!         scheduler.execute(JobKind::Thumbnail, i, |index, ctx| {
//!             ctx.check_cancelled()?;
//!             println!("thumbnail {} on worker {}", index, ctx.worker_id());
//!             Ok(())
//!         })
//!     })
//!     .collect::<Result<_>>()?;
//!
//! // Notifications run here, on the owner thread
//! main_loop.run_until(
//!     || thumbnails.iter().all(|job| job.status().is_terminal()),
//!     Duration::from_secs(5),
//! );
//!
//! scheduler.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Tasks
//!
//! ```rust
//! use rust_job_engine::prelude::*;
//! use parking_lot::Mutex;
//!
//! struct LoadTask {
//!     path: String,
//!     bytes: Mutex<Option<Vec<u8>>>,
//! }
//!
//! impl JobTask for LoadTask {
//!     fn run(&self, ctx: &JobContext) -> Result<()> {
//!         let mut data = Vec::new();
//!         for chunk in 0..4u8 {
//!             ctx.check_cancelled()?;
//!             data.push(chunk);
//!             ctx.report_progress(f32::from(chunk + 1) / 4.0);
//!         }
//!         *self.bytes.lock() = Some(data);
//!         Ok(())
//!     }
//!
//!     fn on_finished(&self, job: &Job, error: Option<&JobError>) {
//!         match error {
//!             None => println!("{} loaded ({})", self.path, job.status()),
//!             Some(e) => println!("{} failed: {}", self.path, e),
//!         }
//!     }
//!
//!     fn name(&self) -> &str {
//!         "LoadTask"
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! # let main_loop = MainLoop::new();
//! # let scheduler = Scheduler::new(main_loop.handle())?;
//! # scheduler.start()?;
//! let job = scheduler.submit(
//!     JobKind::Load,
//!     LoadTask { path: "IMG_0042.jpg".into(), bytes: Mutex::new(None) },
//! )?;
//! # main_loop.run_until(|| job.status().is_terminal(), std::time::Duration::from_secs(5));
//! # scheduler.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! ```rust
//! use rust_job_engine::prelude::*;
//!
//! # fn main() -> Result<()> {
//! # let main_loop = MainLoop::new();
//! # let scheduler = Scheduler::new(main_loop.handle())?;
//! # scheduler.start()?;
//! let scan = scheduler.execute(JobKind::DirectoryScan, (), |_, ctx| {
//!     while !ctx.token().sleep(std::time::Duration::from_millis(10)) {}
//!     ctx.check_cancelled()
//! })?;
//!
//! // Waiting: unlinked, never runs. Running: token tripped, run returns early.
//! assert_eq!(scheduler.cancel(&scan), JobStatus::Canceled);
//! # scheduler.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod dispatch;
pub mod pool;
pub mod prelude;
pub mod queue;
pub mod tracing;

pub use core::{
    CancellationReason, CancellationToken, ClosureTask, ErrorKind, Job, JobContext, JobError,
    JobId, JobInfo, JobKind, JobOptions, JobStatus, JobTask, Result,
};
pub use dispatch::{DispatchTask, Dispatcher, MainLoop, MainLoopHandle};
pub use pool::{Scheduler, SchedulerConfig, SchedulerStats, WorkerStats, WorkerStatsSnapshot};
pub use queue::JobLocation;
