//! Progress bookkeeping and notification coalescing

/// Per-job progress state, kept under the job's lock.
///
/// A worker stores every reported value; a notification is scheduled only
/// when none is outstanding and the value moved far enough. The owner reads
/// whatever value is current when the notification is delivered.
#[derive(Debug, Clone)]
pub(crate) struct ProgressTracker {
    value: f32,
    last_scheduled: f32,
    threshold: f32,
    n_parts: u32,
    nth_part: u32,
    pending: bool,
    scheduled_once: bool,
}

impl ProgressTracker {
    pub(crate) fn new(threshold: f32, n_parts: u32) -> Self {
        Self {
            value: 0.0,
            last_scheduled: 0.0,
            threshold: if threshold.is_nan() {
                0.0
            } else {
                threshold.clamp(0.0, 1.0)
            },
            n_parts: n_parts.max(1),
            nth_part: 0,
            pending: false,
            scheduled_once: false,
        }
    }

    pub(crate) fn value(&self) -> f32 {
        self.value
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending
    }

    /// Store a new value for the current part.
    ///
    /// Returns `true` when the caller must post a progress notification.
    pub(crate) fn update(&mut self, part_progress: f32) -> bool {
        if part_progress.is_nan() {
            return false;
        }

        let part = part_progress.clamp(0.0, 1.0);
        let total = ((self.nth_part as f32 + part) / self.n_parts as f32).min(1.0);
        // never move backwards
        self.value = self.value.max(total);

        if self.pending {
            return false;
        }

        let due = self.value >= 1.0 || self.value - self.last_scheduled >= self.threshold;
        if due && (self.value > self.last_scheduled || !self.scheduled_once) {
            self.pending = true;
            self.scheduled_once = true;
            self.last_scheduled = self.value;
            return true;
        }
        false
    }

    /// Advance to the next part, capped at the part count.
    pub(crate) fn part_finished(&mut self) {
        self.nth_part = (self.nth_part + 1).min(self.n_parts);
    }

    /// Consume the outstanding notification, returning the value to deliver.
    pub(crate) fn take(&mut self) -> f32 {
        self.pending = false;
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesces_while_pending() {
        let mut tracker = ProgressTracker::new(0.0, 1);
        assert!(tracker.update(0.1));
        assert!(!tracker.update(0.2));
        assert!(!tracker.update(0.3));
        assert!(tracker.is_pending());

        // latest value wins
        assert_eq!(tracker.take(), 0.3);
        assert!(!tracker.is_pending());
        assert!(tracker.update(0.4));
    }

    #[test]
    fn test_threshold_suppresses_small_steps() {
        let mut tracker = ProgressTracker::new(0.25, 1);
        assert!(!tracker.update(0.1));
        assert!(!tracker.update(0.2));
        assert!(tracker.update(0.3));
        tracker.take();
        assert!(!tracker.update(0.5));
        assert!(tracker.update(0.6));
    }

    #[test]
    fn test_completion_always_scheduled() {
        let mut tracker = ProgressTracker::new(0.9, 1);
        assert!(!tracker.update(0.5));
        assert!(tracker.update(1.0));
        assert_eq!(tracker.take(), 1.0);
    }

    #[test]
    fn test_values_are_clamped_and_monotonic() {
        let mut tracker = ProgressTracker::new(0.0, 1);
        tracker.update(0.6);
        tracker.take();
        assert!(!tracker.update(0.2));
        assert_eq!(tracker.value(), 0.6);

        assert!(tracker.update(7.0));
        assert_eq!(tracker.take(), 1.0);

        assert!(!tracker.update(f32::NAN));
        assert_eq!(tracker.value(), 1.0);
    }

    #[test]
    fn test_multi_part_progress() {
        let mut tracker = ProgressTracker::new(0.0, 4);
        tracker.update(1.0);
        assert_eq!(tracker.take(), 0.25);

        tracker.part_finished();
        tracker.update(0.5);
        assert_eq!(tracker.take(), 0.375);

        for _ in 0..10 {
            tracker.part_finished();
        }
        tracker.update(0.0);
        assert_eq!(tracker.value(), 1.0);
    }
}
