//! Kind-partitioned FIFO of Waiting jobs.

use crate::core::{Job, JobId, JobKind};
use std::collections::VecDeque;

/// Waiting jobs, one FIFO partition per kind.
///
/// `dequeue_highest` serves partitions in [`JobKind::PRIORITY_ORDER`]; within
/// a partition the oldest job goes first unless a job was pushed as urgent.
///
/// # Example
///
/// ```rust,ignore
/// let mut queue = WorkQueue::new();
/// queue.push(thumbnail_job);
/// queue.push(load_job);
///
/// // Load outranks Thumbnail regardless of arrival order
/// assert_eq!(queue.dequeue_highest().unwrap().kind(), JobKind::Load);
/// ```
#[derive(Debug, Default)]
pub struct WorkQueue {
    partitions: [VecDeque<Job>; JobKind::COUNT],
}

impl WorkQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to its kind's partition; urgent jobs go to the front.
    pub fn push(&mut self, job: Job) {
        let partition = &mut self.partitions[job.kind().priority_rank()];
        if job.is_urgent() {
            partition.push_front(job);
        } else {
            partition.push_back(job);
        }
    }

    /// Remove the next job of the highest-priority non-empty partition
    pub fn dequeue_highest(&mut self) -> Option<Job> {
        self.partitions
            .iter_mut()
            .find_map(|partition| partition.pop_front())
    }

    /// Unlink a specific job. Scans only the partition of `kind`.
    pub fn remove(&mut self, id: JobId, kind: JobKind) -> Option<Job> {
        let partition = &mut self.partitions[kind.priority_rank()];
        let pos = partition.iter().position(|job| job.id() == id)?;
        partition.remove(pos)
    }

    /// Look up a waiting job without unlinking it
    pub fn find(&self, id: JobId, kind: JobKind) -> Option<&Job> {
        self.partitions[kind.priority_rank()]
            .iter()
            .find(|job| job.id() == id)
    }

    /// Take every job out, highest priority first
    pub fn drain(&mut self) -> Vec<Job> {
        self.partitions
            .iter_mut()
            .flat_map(|partition| partition.drain(..))
            .collect()
    }

    /// Total number of waiting jobs
    pub fn len(&self) -> usize {
        self.partitions.iter().map(VecDeque::len).sum()
    }

    /// Whether no job is waiting
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(VecDeque::is_empty)
    }

    /// Number of waiting jobs of one kind
    pub fn len_for(&self, kind: JobKind) -> usize {
        self.partitions[kind.priority_rank()].len()
    }
}
