//! Batch tracking for view commits.

/// Counts points applied since the last commit.
///
/// `count` never exceeds `threshold`: `advance` reports when the batch is
/// full and the owner resets it after a successful commit.
#[derive(Debug, Clone)]
pub struct BatchTracker {
    count: usize,
    threshold: usize,
}

impl BatchTracker {
    /// Create a tracker committing every `threshold` points.
    ///
    /// A threshold of zero is treated as one.
    pub fn new(threshold: usize) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    /// Count one point. Returns true when the batch is full.
    pub fn advance(&mut self) -> bool {
        debug_assert!(self.count < self.threshold);
        self.count += 1;
        self.count == self.threshold
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn has_pending(&self) -> bool {
        self.count > 0
    }
}
