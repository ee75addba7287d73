//! The tick driver.
//!
//! # Tick pipeline
//!
//! Each call to [`PowerSolver::tick`] runs:
//!
//! 1. **Clear** -- zero per-tick accumulators on loads and supplies.
//! 2. **Group** -- fetch the cached height grouping, recomputing it only if
//!    the topology changed.
//! 3. **Solve** -- for each height group in increasing order, solve every
//!    network in the group (in parallel when allowed), then commit the group
//!    before starting the next one.
//! 4. **Reconcile** -- zero batteries no network touched this tick.
//! 5. **Ramp** -- move ramp positions toward their targets.
//!
//! The result does not depend on the parallelism degree.

use tracing::warn;

use crate::config::SolverConfig;
use crate::id::NetworkId;
use crate::ramp::update_ramp_positions;
use crate::reconcile::reconcile_batteries;
use crate::solve::NetworkScratch;
use crate::state::PowerState;

/// The seam a host simulation loop calls once per tick.
pub trait PowerSolver: Send {
    /// Advance `state` by `frame_time` seconds, solving independent networks
    /// on up to `parallel` workers.
    fn tick(&mut self, frame_time: f32, state: &mut PowerState, parallel: usize);
}

/// Zero what the solve recomputes every tick. Paused nodes keep their values.
pub fn clear_loads_and_supplies(state: &mut PowerState) {
    for load in state.loads.values_mut() {
        if load.paused {
            continue;
        }
        load.receiving_power = 0.0;
    }
    for supply in state.supplies.values_mut() {
        if supply.paused {
            continue;
        }
        supply.current_supply = 0.0;
        supply.supply_ramp_target = 0.0;
    }
}

fn solve_one(state: &PowerState, id: NetworkId, frame_time: f32) -> Option<NetworkScratch> {
    let mut scratch = NetworkScratch::gather(state, id)?;
    scratch.solve(frame_time);
    Some(scratch)
}

#[cfg(feature = "parallel")]
struct WorkerPool {
    threads: usize,
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

/// Demand-proportional solver with battery pass-through and ramped supplies.
#[derive(Debug, Default)]
pub struct BatteryRampPegSolver {
    config: SolverConfig,
    #[cfg(feature = "parallel")]
    pool: Option<WorkerPool>,
    #[cfg(feature = "profiling")]
    last_profile: Option<crate::profiling::TickProfile>,
}

impl BatteryRampPegSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Tick using the configured parallelism.
    pub fn step(&mut self, frame_time: f32, state: &mut PowerState) {
        let parallel = self.config.parallelism;
        self.tick(frame_time, state, parallel);
    }

    /// Timing profile of the most recent tick.
    #[cfg(feature = "profiling")]
    pub fn last_profile(&self) -> Option<&crate::profiling::TickProfile> {
        self.last_profile.as_ref()
    }

    /// Gather and solve every network in one height group.
    #[cfg(feature = "parallel")]
    fn solve_group(
        &mut self,
        state: &PowerState,
        group: &[NetworkId],
        frame_time: f32,
        parallel: usize,
    ) -> Vec<NetworkScratch> {
        use rayon::prelude::*;

        if parallel > 1 && group.len() > 1 {
            if let Some(pool) = self.pool_for(parallel) {
                return pool.install(|| {
                    group
                        .par_iter()
                        .filter_map(|&id| solve_one(state, id, frame_time))
                        .collect()
                });
            }
        }
        group
            .iter()
            .filter_map(|&id| solve_one(state, id, frame_time))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn solve_group(
        &mut self,
        state: &PowerState,
        group: &[NetworkId],
        frame_time: f32,
        _parallel: usize,
    ) -> Vec<NetworkScratch> {
        group
            .iter()
            .filter_map(|&id| solve_one(state, id, frame_time))
            .collect()
    }

    /// The worker pool for `threads` workers, rebuilt only when the requested
    /// size changes. `None` if the pool cannot be built.
    #[cfg(feature = "parallel")]
    fn pool_for(&mut self, threads: usize) -> Option<&rayon::ThreadPool> {
        if self.pool.as_ref().is_none_or(|p| p.threads != threads) {
            let built = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("substation-solver-{i}"))
                .build();
            match built {
                Ok(pool) => self.pool = Some(WorkerPool { threads, pool }),
                Err(err) => {
                    warn!(
                        target: "substation::solver",
                        threads,
                        error = %err,
                        "worker pool unavailable, solving sequentially"
                    );
                    self.pool = None;
                    return None;
                }
            }
        }
        self.pool.as_ref().map(|p| &p.pool)
    }
}

impl PowerSolver for BatteryRampPegSolver {
    fn tick(&mut self, frame_time: f32, state: &mut PowerState, parallel: usize) {
        if !(frame_time.is_finite() && frame_time > 0.0) {
            warn!(
                target: "substation::solver",
                frame_time,
                "skipping power tick with invalid frame time"
            );
            return;
        }

        #[cfg(feature = "profiling")]
        let tick_start = std::time::Instant::now();

        // Phase 1: Clear.
        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        clear_loads_and_supplies(state);
        #[cfg(feature = "profiling")]
        let clear_dur = phase_start.elapsed();

        // Phase 2: Group.
        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        let groups = state.take_grouping();
        #[cfg(feature = "profiling")]
        let grouping_dur = phase_start.elapsed();

        // Phase 3: Solve, one height group at a time. A group is fully
        // committed before the next one gathers.
        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        #[cfg(feature = "profiling")]
        let mut networks_solved = 0usize;
        for group in &groups {
            let solved = self.solve_group(state, group, frame_time, parallel);
            #[cfg(feature = "profiling")]
            {
                networks_solved += solved.len();
            }
            for scratch in solved {
                scratch.commit(state);
            }
        }
        #[cfg(feature = "profiling")]
        let group_count = groups.len();
        state.restore_grouping(groups);
        #[cfg(feature = "profiling")]
        let solve_dur = phase_start.elapsed();

        // Phase 4: Reconcile.
        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        reconcile_batteries(state);
        #[cfg(feature = "profiling")]
        let reconcile_dur = phase_start.elapsed();

        // Phase 5: Ramp.
        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        update_ramp_positions(state, frame_time, self.config.ramp_snap_threshold);
        #[cfg(feature = "profiling")]
        let ramp_dur = phase_start.elapsed();

        #[cfg(feature = "profiling")]
        {
            self.last_profile = Some(crate::profiling::TickProfile {
                clear: clear_dur,
                grouping: grouping_dur,
                solve: solve_dur,
                reconcile: reconcile_dur,
                ramp: ramp_dur,
                total: tick_start.elapsed(),
                groups: group_count,
                networks: networks_solved,
            });
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
