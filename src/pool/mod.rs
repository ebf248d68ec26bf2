//! Scheduler and worker implementations

pub mod config;
pub mod scheduler;
pub mod worker;

pub use config::SchedulerConfig;
pub use scheduler::{Scheduler, SchedulerStats};
pub use worker::{Worker, WorkerStats, WorkerStatsSnapshot};
