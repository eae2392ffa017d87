use std::fmt;

/// Join-counter for the upload tasks spawned for one directory level.
///
/// One instance exists per directory level being mirrored and is discarded
/// once that level settles. `total` is fixed at construction, before any
/// child task can complete, so progress can never overshoot 100%.
#[derive(Debug)]
pub struct ProgressTracker {
    completed: usize,
    total: usize,
}

impl ProgressTracker {
    /// Creates a tracker for a level with `total` immediate children.
    pub fn new(total: usize) -> Self {
        Self {
            completed: 0,
            total,
        }
    }

    /// Records that one child (file upload or subtree) has settled, with
    /// either success or failure, and returns the updated snapshot.
    pub fn child_settled(&mut self) -> ProgressSnapshot {
        debug_assert!(
            self.completed < self.total,
            "more children settled than the level holds"
        );
        self.completed = (self.completed + 1).min(self.total);
        self.snapshot()
    }

    /// Current counters without recording a settlement.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed,
            total: self.total,
        }
    }

    /// True once every child of the level has settled.
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

/// Point-in-time view of one level's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    /// Percentage of the level's children that have settled, rounded to one
    /// decimal place. An empty level counts as fully complete.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        let raw = self.completed as f64 / self.total as f64 * 100.0;
        (raw * 10.0).round() / 10.0
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% ({}/{})",
            self.percent(),
            self.completed,
            self.total
        )
    }
}
