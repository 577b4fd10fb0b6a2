//! Progress milestones derived from the completed-batch counter.

use std::time::{Duration, Instant};

/// A crossed percentage boundary for the current file.
#[derive(Clone, Debug)]
pub struct Milestone {
    pub percent: u64,
    pub completed: u64,
    pub elapsed: Duration,
}

/// Pure function of the progress counter and elapsed time since file start.
///
/// Holds no state beyond the last reported boundary, so milestones can be
/// recomputed from the counter alone regardless of completion order.
pub struct ProgressReporter {
    total: u64,
    step_percent: u64,
    started: Instant,
    last_percent: u64,
}

impl ProgressReporter {
    /// `total` must be > 0; a zero-batch file never constructs a reporter.
    pub fn new(total: u64, step_percent: u64) -> Self {
        debug_assert!(total > 0, "zero-batch files bypass progress reporting");
        Self {
            total,
            step_percent: step_percent.clamp(1, 100),
            started: Instant::now(),
            last_percent: 0,
        }
    }

    /// Milestone if `completed` crossed a new step boundary, else `None`.
    pub fn observe(&mut self, completed: u64) -> Option<Milestone> {
        let percent = completed * 100 / self.total;
        let boundary = percent - percent % self.step_percent;
        if boundary > self.last_percent {
            self.last_percent = boundary;
            Some(Milestone {
                percent: boundary,
                completed,
                elapsed: self.started.elapsed(),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milestones_at_step_boundaries() {
        let mut progress = ProgressReporter::new(20, 10);
        assert!(progress.observe(1).is_none()); // 5%
        let m = progress.observe(2).unwrap(); // 10%
        assert_eq!(m.percent, 10);
        assert_eq!(m.completed, 2);
        assert!(progress.observe(3).is_none()); // 15%
        assert_eq!(progress.observe(4).unwrap().percent, 20);
    }

    #[test]
    fn test_skipped_boundaries_collapse_to_latest() {
        let mut progress = ProgressReporter::new(100, 10);
        assert_eq!(progress.observe(55).unwrap().percent, 50);
        assert!(progress.observe(56).is_none());
    }

    #[test]
    fn test_completion_reaches_one_hundred() {
        let mut progress = ProgressReporter::new(3, 10);
        progress.observe(1);
        progress.observe(2);
        assert_eq!(progress.observe(3).unwrap().percent, 100);
    }

    #[test]
    fn test_no_duplicate_milestones() {
        let mut progress = ProgressReporter::new(10, 10);
        assert!(progress.observe(1).is_some());
        assert!(progress.observe(1).is_none());
    }

    #[test]
    fn test_single_batch_file() {
        let mut progress = ProgressReporter::new(1, 10);
        assert_eq!(progress.observe(1).unwrap().percent, 100);
    }
}
