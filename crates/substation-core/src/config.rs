//! Solver configuration.
//!
//! Plain serde data so hosts can load it from any format; the
//! `substation-data` crate provides file loading.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::ramp::DEFAULT_RAMP_SNAP_THRESHOLD;

/// Tunables for [`BatteryRampPegSolver`](crate::solver::BatteryRampPegSolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Worker threads used to solve a height group. `1` solves sequentially.
    pub parallelism: usize,
    /// Ramp deviations at or below this snap straight to the target.
    pub ramp_snap_threshold: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            parallelism: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            ramp_snap_threshold: DEFAULT_RAMP_SNAP_THRESHOLD,
        }
    }
}

impl SolverConfig {
    /// A configuration that never spawns worker threads.
    pub fn sequential() -> Self {
        Self {
            parallelism: 1,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_at_least_one_worker() {
        assert!(SolverConfig::default().parallelism >= 1);
        assert_eq!(SolverConfig::sequential().parallelism, 1);
    }

    #[test]
    fn default_snap_threshold() {
        assert_eq!(
            SolverConfig::default().ramp_snap_threshold,
            DEFAULT_RAMP_SNAP_THRESHOLD
        );
    }
}
