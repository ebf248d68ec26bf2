//! Where each live job is.

use crate::core::{JobId, JobKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Position of a live job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobLocation {
    /// Waiting in the partition of this kind
    Queued(JobKind),
    /// Held by a worker slot
    Running {
        /// Index of the worker
        worker: usize,
    },
}

/// Map from job id to location. Terminal jobs are not tracked.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<JobId, JobLocation>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a job as waiting in its partition
    pub fn mark_queued(&mut self, id: JobId, kind: JobKind) {
        self.entries.insert(id, JobLocation::Queued(kind));
    }

    /// Record a job as held by `worker`
    pub fn mark_running(&mut self, id: JobId, worker: usize) {
        self.entries.insert(id, JobLocation::Running { worker });
    }

    /// Forget a job, returning where it was
    pub fn remove(&mut self, id: JobId) -> Option<JobLocation> {
        self.entries.remove(&id)
    }

    /// Look up a job
    pub fn get(&self, id: JobId) -> Option<JobLocation> {
        self.entries.get(&id).copied()
    }

    /// Number of tracked jobs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_transitions() {
        let mut registry = Registry::new();
        let id = JobId::next();

        assert_eq!(registry.get(id), None);
        registry.mark_queued(id, JobKind::Transform);
        assert_eq!(registry.get(id), Some(JobLocation::Queued(JobKind::Transform)));

        registry.mark_running(id, 1);
        assert_eq!(registry.get(id), Some(JobLocation::Running { worker: 1 }));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.remove(id), Some(JobLocation::Running { worker: 1 }));
        assert!(registry.is_empty());
    }
}
