//! Job kinds and their scheduling priority
//!
//! Every job belongs to exactly one [`JobKind`]. The kind selects the work
//! queue partition the job waits in, and partitions are drained in the
//! fixed order of [`JobKind::PRIORITY_ORDER`]: work on the item the user is
//! looking at comes before housekeeping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Decode an image for display
    Load,
    /// Generate a thumbnail
    Thumbnail,
    /// Apply a pixel transform to loaded images
    Transform,
    /// Scan a directory and populate a model
    DirectoryScan,
    /// Write an image to disk
    Save,
}

impl JobKind {
    /// Number of kinds (and of queue partitions)
    pub const COUNT: usize = 5;

    /// All kinds, highest priority first
    pub const PRIORITY_ORDER: [JobKind; JobKind::COUNT] = [
        JobKind::Load,
        JobKind::Transform,
        JobKind::DirectoryScan,
        JobKind::Thumbnail,
        JobKind::Save,
    ];

    /// Position in [`PRIORITY_ORDER`](Self::PRIORITY_ORDER); 0 is served first
    pub fn priority_rank(self) -> usize {
        match self {
            JobKind::Load => 0,
            JobKind::Transform => 1,
            JobKind::DirectoryScan => 2,
            JobKind::Thumbnail => 3,
            JobKind::Save => 4,
        }
    }

    /// Whether jobs of this kind are dequeued before jobs of `other`
    pub fn outranks(self, other: JobKind) -> bool {
        self.priority_rank() < other.priority_rank()
    }

    /// Stable lower-case name, used in thread names and log fields
    pub fn name(self) -> &'static str {
        match self {
            JobKind::Load => "load",
            JobKind::Thumbnail => "thumbnail",
            JobKind::Transform => "transform",
            JobKind::DirectoryScan => "directory-scan",
            JobKind::Save => "save",
        }
    }

    /// Parse a name produced by [`name`](Self::name)
    pub fn from_name(name: &str) -> Option<JobKind> {
        JobKind::PRIORITY_ORDER
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(JobKind::Load.outranks(JobKind::Transform));
        assert!(JobKind::Transform.outranks(JobKind::DirectoryScan));
        assert!(JobKind::DirectoryScan.outranks(JobKind::Thumbnail));
        assert!(JobKind::Thumbnail.outranks(JobKind::Save));
        assert!(!JobKind::Save.outranks(JobKind::Load));
        assert!(!JobKind::Load.outranks(JobKind::Load));
    }

    #[test]
    fn test_rank_matches_priority_order() {
        for (rank, kind) in JobKind::PRIORITY_ORDER.iter().enumerate() {
            assert_eq!(kind.priority_rank(), rank);
        }
    }

    #[test]
    fn test_name_round_trip() {
        for kind in JobKind::PRIORITY_ORDER {
            assert_eq!(JobKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(JobKind::from_name("THUMBNAIL"), Some(JobKind::Thumbnail));
        assert_eq!(JobKind::from_name("print"), None);
    }

    #[test]
    fn test_kind_serializes_as_variant_name() {
        let json = serde_json::to_string(&JobKind::DirectoryScan).unwrap();
        assert_eq!(json, "\"DirectoryScan\"");
    }
}
