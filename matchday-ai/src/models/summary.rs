//! Batch run summary

use serde::{Deserialize, Serialize};

/// Per-outcome counts for one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Items never started because the run was cancelled
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Items that reached a terminal outcome
    pub fn processed(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}
