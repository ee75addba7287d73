//! Substation Core -- electrical network solving for simulation games.
//!
//! This crate owns the power graph (loads, supplies, batteries and the
//! networks wiring them together) and the solver that balances it once per
//! simulation tick.
//!
//! # Tick Pipeline
//!
//! Each call to [`solver::PowerSolver::tick`] runs five phases:
//!
//! 1. **Clear** -- Zero per-tick load and supply accumulators.
//! 2. **Group** -- Order networks by battery-discharge dependency into height
//!    groups (cached until the topology changes).
//! 3. **Solve** -- Balance every network, one height group at a time.
//!    Networks within a group are independent and may be solved in parallel.
//! 4. **Reconcile** -- Zero the flows of batteries no network touched.
//! 5. **Ramp** -- Move supply and battery ramp positions toward their targets.
//!
//! # Topology Changes
//!
//! Membership is only changed through [`state::PowerState`] methods, which
//! keep both sides of every link consistent and invalidate the grouping:
//!
//! ```rust,ignore
//! let net = state.add_network();
//! let load = state.add_load(net, Load { desired_power: 60.0, ..Default::default() })?;
//! let battery = state.add_battery(Battery::default());
//! state.set_battery_discharging_network(battery, Some(net))?;
//! ```
//!
//! # Key Types
//!
//! - [`state::PowerState`] -- Arena-backed power graph.
//! - [`solver::BatteryRampPegSolver`] -- The tick driver.
//! - [`solve::NetworkScratch`] -- Gather/solve/commit unit for one network.
//! - [`config::SolverConfig`] -- Parallelism and ramp tunables.
//! - [`serialize`] -- Versioned binary snapshots via bitcode.

pub mod config;
pub mod grouping;
pub mod id;
pub mod invariant;
#[cfg(feature = "profiling")]
pub mod profiling;
pub mod ramp;
pub mod reconcile;
pub mod serialize;
pub mod solve;
pub mod solver;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
