//! Waiting-job storage.
//!
//! [`WorkQueue`] keeps Waiting jobs partitioned by [`JobKind`](crate::JobKind)
//! and [`Registry`] records where every live job currently is. Both live
//! under the scheduler's single queue lock; neither type synchronizes
//! anything on its own.

mod registry;
mod work_queue;

pub use registry::{JobLocation, Registry};
pub use work_queue::WorkQueue;
