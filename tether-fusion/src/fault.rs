//! Detection of non-finite pose samples.
//!
//! Prediction lets NaN flow through untouched; this monitor sits beside it
//! and flags the tracker losing its solution.

use tether_data::Pose;
use tracing::warn;

#[derive(Debug, Default)]
pub struct PoseFaultMonitor {
    faults: u64,
}

impl PoseFaultMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `pose` has a non-finite translation.
    pub fn check(&mut self, pose: &Pose) -> bool {
        if pose.has_finite_translation() {
            return false;
        }
        if self.faults == 0 {
            warn!(
                "Pose at {:.3} ms has a non-finite translation {:?}",
                pose.timestamp_ms, pose.translation
            );
        }
        self.faults += 1;
        true
    }

    /// Non-finite poses seen so far.
    pub fn fault_count(&self) -> u64 {
        self.faults
    }
}
