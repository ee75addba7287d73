//! Per-tick timing for the solver.
//!
//! Only available when the `profiling` feature is enabled.

use std::time::Duration;

/// Per-phase timing from the most recent solver tick.
#[derive(Debug, Clone, Default)]
pub struct TickProfile {
    pub clear: Duration,
    pub grouping: Duration,
    pub solve: Duration,
    pub reconcile: Duration,
    pub ramp: Duration,
    pub total: Duration,
    /// Height groups processed.
    pub groups: usize,
    /// Networks solved across all groups.
    pub networks: usize,
}

impl TickProfile {
    /// Returns the name and duration of the slowest phase.
    pub fn bottleneck_phase(&self) -> (&'static str, Duration) {
        [
            ("grouping", self.grouping),
            ("solve", self.solve),
            ("reconcile", self.reconcile),
            ("ramp", self.ramp),
        ]
        .into_iter()
        .fold(("clear", self.clear), |slowest, phase| {
            if phase.1 > slowest.1 { phase } else { slowest }
        })
    }
}
