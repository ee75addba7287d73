//! The per-network solve step.
//!
//! A network is solved in three phases:
//!
//! 1. **Gather** -- copy the network's loads, supplies and battery taps out
//!    of the shared [`PowerState`] into a [`NetworkScratch`]. Reads only.
//! 2. **Solve** -- balance demand against local and battery supply, touching
//!    nothing but the scratch.
//! 3. **Commit** -- write the scratch records back into the state.
//!
//! Gathering and solving need only `&PowerState`, so every network in a
//! height group can be gathered and solved on a different worker. Commits
//! are applied one after another once the whole group has finished.

use crate::id::{BatteryId, LoadId, NetworkId, SupplyId};
use crate::invariant::{guard_non_negative, guard_storage};
use crate::state::{Battery, Load, PowerState, Supply};

/// Private working copy of everything one network's solve reads or writes.
#[derive(Debug, Clone)]
pub struct NetworkScratch {
    network: NetworkId,
    loads: Vec<(LoadId, Load)>,
    supplies: Vec<(SupplyId, Supply)>,
    /// Each battery appears once even if it both charges from and
    /// discharges into this network.
    batteries: Vec<(BatteryId, Battery)>,
    /// Indices into `batteries` of the charging taps.
    charging: Vec<usize>,
    /// Indices into `batteries` of the discharging taps.
    discharging: Vec<usize>,
    last_combined_supply: f32,
    last_combined_max_supply: f32,
}

impl NetworkScratch {
    /// Copy a network's members out of the state. Returns `None` if the
    /// network does not exist.
    pub fn gather(state: &PowerState, id: NetworkId) -> Option<Self> {
        let network = state.network(id)?;

        let loads = network
            .loads()
            .iter()
            .filter_map(|&l| state.load(l).map(|load| (l, *load)))
            .collect();
        let supplies = network
            .supplies()
            .iter()
            .filter_map(|&s| state.supply(s).map(|supply| (s, *supply)))
            .collect();

        let mut batteries: Vec<(BatteryId, Battery)> = Vec::new();
        let slot_of = |battery_id: BatteryId, batteries: &mut Vec<(BatteryId, Battery)>| {
            if let Some(idx) = batteries.iter().position(|(b, _)| *b == battery_id) {
                return Some(idx);
            }
            let battery = state.battery(battery_id)?;
            batteries.push((battery_id, *battery));
            Some(batteries.len() - 1)
        };
        let charging = network
            .battery_loads()
            .iter()
            .filter_map(|&b| slot_of(b, &mut batteries))
            .collect();
        let discharging = network
            .battery_supplies()
            .iter()
            .filter_map(|&b| slot_of(b, &mut batteries))
            .collect();

        Some(Self {
            network: id,
            loads,
            supplies,
            batteries,
            charging,
            discharging,
            last_combined_supply: network.last_combined_supply(),
            last_combined_max_supply: network.last_combined_max_supply(),
        })
    }

    /// Balance the network for a tick of `frame_time` seconds.
    pub fn solve(&mut self, frame_time: f32) {
        // Demand: loads plus charging batteries.
        let mut demand = 0.0f32;
        for (_, load) in &self.loads {
            if !load.enabled || load.paused {
                continue;
            }
            demand += guard_non_negative(
                load.desired_power,
                load.desired_power,
                "load desired power",
            );
        }
        for &idx in &self.charging {
            let battery = &mut self.batteries[idx].1;
            if !battery.enabled || !battery.can_charge || battery.paused {
                continue;
            }
            battery.desired_power = battery.charge_demand(frame_time);
            demand += battery.desired_power;
        }

        // Local supply, limited by each generator's ramp.
        let mut total_supply = 0.0f32;
        let mut total_max_supply = 0.0f32;
        for (_, supply) in &mut self.supplies {
            if !supply.enabled || supply.paused {
                continue;
            }
            let ramp_max = supply.supply_ramp_position + supply.supply_ramp_tolerance;
            supply.available_supply = ramp_max.min(supply.max_supply).max(0.0);
            total_supply += supply.available_supply;
            total_max_supply += supply.max_supply;
        }

        let unmet = (demand - total_supply).max(0.0);

        // Battery supply is only tapped once local generation falls short.
        let mut total_battery_supply = 0.0f32;
        let mut total_max_battery_supply = 0.0f32;
        if unmet > 0.0 {
            for &idx in &self.discharging {
                let battery = &mut self.batteries[idx].1;
                if !battery.enabled || !battery.can_discharge || battery.paused {
                    continue;
                }
                let scaled_storage = battery.current_storage / frame_time;
                let supply_cap = battery
                    .max_supply
                    .min(battery.supply_ramp_position + battery.supply_ramp_tolerance);
                // Charge current can be relayed straight out without going
                // through storage.
                let pass_through = battery.current_receiving * battery.efficiency;
                battery.available_supply = scaled_storage.min(supply_cap + pass_through).max(0.0);
                battery.max_effective_supply = scaled_storage
                    .min(battery.max_supply + pass_through)
                    .max(0.0);
                battery.loading_network_demand = unmet;

                total_battery_supply += battery.available_supply;
                total_max_battery_supply += battery.max_effective_supply;
            }
        }

        self.last_combined_supply = total_supply + total_battery_supply;
        self.last_combined_max_supply = total_max_supply + total_max_battery_supply;

        let met = demand.min(self.last_combined_supply);
        if met <= 0.0 {
            return;
        }

        // Everyone gets the same fraction of what they asked for. Shares
        // multiply before dividing so a fully met request comes out exact.
        for (_, load) in &mut self.loads {
            if !load.enabled || load.paused {
                continue;
            }
            load.receiving_power = load.desired_power.max(0.0) * met / demand;
        }
        for &idx in &self.charging {
            let battery = &mut self.batteries[idx].1;
            if !battery.enabled || !battery.can_charge || battery.paused {
                continue;
            }
            battery.current_receiving = battery.desired_power * met / demand;
            battery.current_storage = guard_storage(
                battery.current_storage
                    + frame_time * battery.current_receiving * battery.efficiency,
                battery.capacity,
            );
            battery.loading_marked = true;
        }

        let met_supply = demand.min(total_supply);
        if met_supply > 0.0 {
            let target_supply = demand.min(total_max_supply);
            for (_, supply) in &mut self.supplies {
                if !supply.enabled || supply.paused {
                    continue;
                }
                supply.current_supply = supply.available_supply * met_supply / total_supply;
                supply.supply_ramp_target = if total_max_supply > 0.0 {
                    supply.max_supply * target_supply / total_max_supply
                } else {
                    0.0
                };
            }
        }

        if unmet > 0.0 && total_battery_supply > 0.0 {
            let met_battery = unmet.min(total_battery_supply);
            for &idx in &self.discharging {
                let battery = &mut self.batteries[idx].1;
                if !battery.enabled || !battery.can_discharge || battery.paused {
                    continue;
                }
                battery.current_supply =
                    battery.available_supply * met_battery / total_battery_supply;
                battery.current_storage = guard_non_negative(
                    battery.current_storage - frame_time * battery.current_supply,
                    battery.capacity,
                    "battery storage",
                );
                // The ramp only has to cover what pass-through does not.
                battery.supply_ramp_target = (battery.current_supply
                    - battery.current_receiving * battery.efficiency)
                    .max(0.0);
                battery.supplying_marked = true;
            }
        }
    }

    /// Write the solved records back into the state.
    pub fn commit(self, state: &mut PowerState) {
        for (id, load) in self.loads {
            if let Some(slot) = state.loads.get_mut(id) {
                *slot = load;
            }
        }
        for (id, supply) in self.supplies {
            if let Some(slot) = state.supplies.get_mut(id) {
                *slot = supply;
            }
        }
        for (id, battery) in self.batteries {
            if let Some(slot) = state.batteries.get_mut(id) {
                *slot = battery;
            }
        }
        if let Some(network) = state.networks.get_mut(self.network) {
            network.last_combined_supply = self.last_combined_supply;
            network.last_combined_max_supply = self.last_combined_max_supply;
        }
    }
}

/// Gather, solve and commit a single network in place.
pub fn solve_network(state: &mut PowerState, id: NetworkId, frame_time: f32) {
    if let Some(mut scratch) = NetworkScratch::gather(state, id) {
        scratch.solve(frame_time);
        scratch.commit(state);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
