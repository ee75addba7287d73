//! The power state graph: loads, supplies, batteries and the networks that
//! wire them together.
//!
//! Node records ([`Load`], [`Supply`], [`Battery`]) are plain data with public
//! fields; hosts mutate them freely between ticks. Membership (which network a
//! node is wired into) lives on [`PowerState`] and can only be changed through
//! the topology methods, each of which marks the cached height grouping stale.

use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};

use crate::id::{BatteryId, LoadId, NetworkId, SupplyId};

/// Default ramp speed for supplies and batteries, in watts per second.
pub const DEFAULT_RAMP_RATE: f32 = 5000.0;

/// Default instantaneous slack above the ramp position, in watts.
pub const DEFAULT_RAMP_TOLERANCE: f32 = 5000.0;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors from topology operations on a [`PowerState`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("network not found: {0:?}")]
    NetworkNotFound(NetworkId),
    #[error("load not found: {0:?}")]
    LoadNotFound(LoadId),
    #[error("supply not found: {0:?}")]
    SupplyNotFound(SupplyId),
    #[error("battery not found: {0:?}")]
    BatteryNotFound(BatteryId),
}

// ---------------------------------------------------------------------------
// Node records
// ---------------------------------------------------------------------------

/// A power sink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Load {
    /// Power requested this tick, in watts. Never negative.
    pub desired_power: f32,
    /// Power actually delivered by the last tick.
    pub receiving_power: f32,
    pub enabled: bool,
    /// Paused nodes are skipped entirely and keep their last values.
    pub paused: bool,
}

impl Default for Load {
    fn default() -> Self {
        Self {
            desired_power: 0.0,
            receiving_power: 0.0,
            enabled: true,
            paused: false,
        }
    }
}

/// A power source with a smoothed output.
///
/// `0 <= current_supply <= available_supply <= max_supply` holds after every
/// tick (up to float tolerance).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Supply {
    /// Hard output ceiling.
    pub max_supply: f32,
    /// Output the generator is currently ramped up to.
    pub supply_ramp_position: f32,
    /// Where the solver wants the ramp position to go.
    pub supply_ramp_target: f32,
    /// Slack the generator may instantly deliver above its ramp position.
    pub supply_ramp_tolerance: f32,
    /// Maximum ramp movement per second.
    pub supply_ramp_rate: f32,
    /// Output delivered by the last tick.
    pub current_supply: f32,
    /// Output cap computed for the last tick.
    pub available_supply: f32,
    pub enabled: bool,
    pub paused: bool,
}

impl Default for Supply {
    fn default() -> Self {
        Self {
            max_supply: 0.0,
            supply_ramp_position: 0.0,
            supply_ramp_target: 0.0,
            supply_ramp_tolerance: DEFAULT_RAMP_TOLERANCE,
            supply_ramp_rate: DEFAULT_RAMP_RATE,
            current_supply: 0.0,
            available_supply: 0.0,
            enabled: true,
            paused: false,
        }
    }
}

/// A storage node. Acts as a load on the network it charges from and as a
/// supply on the network it discharges into (possibly the same one).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    /// Energy capacity, in joules.
    pub capacity: f32,
    /// Stored energy. Kept within `0..=capacity`.
    pub current_storage: f32,
    /// Maximum rate at which the battery draws from its charging network.
    pub max_charge_rate: f32,
    /// Maximum discharge output.
    pub max_supply: f32,
    /// Fraction of charge current that ends up in storage, in `0..=1`.
    pub efficiency: f32,
    pub can_charge: bool,
    pub can_discharge: bool,
    pub enabled: bool,
    pub paused: bool,

    pub supply_ramp_position: f32,
    pub supply_ramp_target: f32,
    pub supply_ramp_tolerance: f32,
    pub supply_ramp_rate: f32,

    // -- Load side --
    /// Charge power requested this tick.
    pub desired_power: f32,
    /// Charge power received this tick.
    pub current_receiving: f32,

    // -- Supply side --
    /// Discharge cap for this tick, including pass-through.
    pub available_supply: f32,
    /// Discharge delivered this tick.
    pub current_supply: f32,
    /// Discharge cap ignoring the ramp; feeds the network's max supply.
    pub max_effective_supply: f32,
    /// Unmet demand on the discharging network, read by the charging side
    /// to pull extra power through for pass-through.
    pub loading_network_demand: f32,

    /// Set when a network solve discharged this battery this tick.
    pub supplying_marked: bool,
    /// Set when a network solve charged this battery this tick.
    pub loading_marked: bool,
}

impl Default for Battery {
    fn default() -> Self {
        Self {
            capacity: 0.0,
            current_storage: 0.0,
            max_charge_rate: 0.0,
            max_supply: 0.0,
            efficiency: 1.0,
            can_charge: true,
            can_discharge: true,
            enabled: true,
            paused: false,
            supply_ramp_position: 0.0,
            supply_ramp_target: 0.0,
            supply_ramp_tolerance: DEFAULT_RAMP_TOLERANCE,
            supply_ramp_rate: DEFAULT_RAMP_RATE,
            desired_power: 0.0,
            current_receiving: 0.0,
            available_supply: 0.0,
            current_supply: 0.0,
            max_effective_supply: 0.0,
            loading_network_demand: 0.0,
            supplying_marked: false,
            loading_marked: false,
        }
    }
}

impl Battery {
    /// Charge power this battery wants for a tick of `frame_time` seconds.
    ///
    /// Draws its own charge rate plus whatever the discharging side could not
    /// cover last time (so that power can pass straight through), limited by
    /// the remaining room in storage.
    pub fn charge_demand(&self, frame_time: f32) -> f32 {
        if self.efficiency <= 0.0 {
            return 0.0;
        }
        let space = ((self.capacity - self.current_storage) / self.efficiency).max(0.0);
        let scaled_space = space / frame_time;
        let charge_rate = self.max_charge_rate + self.loading_network_demand / self.efficiency;
        charge_rate.min(scaled_space).max(0.0)
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// A maximal set of directly wired nodes.
///
/// Membership is maintained by [`PowerState`]; read it through the accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub(crate) loads: Vec<LoadId>,
    pub(crate) supplies: Vec<SupplyId>,
    /// Batteries charging from this network.
    pub(crate) battery_loads: Vec<BatteryId>,
    /// Batteries discharging into this network.
    pub(crate) battery_supplies: Vec<BatteryId>,
    pub(crate) height: Option<usize>,
    pub(crate) last_combined_supply: f32,
    pub(crate) last_combined_max_supply: f32,
}

impl Network {
    pub fn loads(&self) -> &[LoadId] {
        &self.loads
    }

    pub fn supplies(&self) -> &[SupplyId] {
        &self.supplies
    }

    pub fn battery_loads(&self) -> &[BatteryId] {
        &self.battery_loads
    }

    pub fn battery_supplies(&self) -> &[BatteryId] {
        &self.battery_supplies
    }

    /// Topological depth assigned by the last grouping pass. `None` until the
    /// network has been grouped at least once.
    pub fn height(&self) -> Option<usize> {
        self.height
    }

    /// Local plus battery supply offered during the last solve.
    pub fn last_combined_supply(&self) -> f32 {
        self.last_combined_supply
    }

    /// Theoretical maximum supply seen during the last solve.
    pub fn last_combined_max_supply(&self) -> f32 {
        self.last_combined_max_supply
    }
}

fn push_unique<K: PartialEq>(list: &mut Vec<K>, key: K) {
    if !list.contains(&key) {
        list.push(key);
    }
}

// ---------------------------------------------------------------------------
// PowerState
// ---------------------------------------------------------------------------

/// Root container for the whole power graph.
///
/// Owns every node and network plus a cached grouping of networks by height.
/// The cache is derived data: it is dropped by every topology change and
/// rebuilt lazily by the next tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerState {
    pub(crate) loads: SlotMap<LoadId, Load>,
    pub(crate) supplies: SlotMap<SupplyId, Supply>,
    pub(crate) batteries: SlotMap<BatteryId, Battery>,
    pub(crate) networks: SlotMap<NetworkId, Network>,

    load_network: SecondaryMap<LoadId, NetworkId>,
    supply_network: SecondaryMap<SupplyId, NetworkId>,
    battery_charging: SecondaryMap<BatteryId, NetworkId>,
    battery_discharging: SecondaryMap<BatteryId, NetworkId>,

    /// Networks grouped by height. `None` means stale.
    #[serde(skip)]
    pub(crate) grouped_nets: Option<Vec<Vec<NetworkId>>>,
}

impl PowerState {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Grouping cache
    // -----------------------------------------------------------------------

    /// Mark the height grouping stale so the next tick recomputes it.
    pub fn invalidate_grouping(&mut self) {
        self.grouped_nets = None;
    }

    /// Returns `true` if the height grouping must be recomputed.
    pub fn is_grouping_stale(&self) -> bool {
        self.grouped_nets.is_none()
    }

    // -----------------------------------------------------------------------
    // Networks
    // -----------------------------------------------------------------------

    /// Create an empty network.
    pub fn add_network(&mut self) -> NetworkId {
        self.invalidate_grouping();
        self.networks.insert(Network::default())
    }

    /// Remove a network, detaching every node wired into it. The nodes
    /// themselves stay in the state.
    pub fn remove_network(&mut self, id: NetworkId) -> Result<Network, StateError> {
        let network = self
            .networks
            .remove(id)
            .ok_or(StateError::NetworkNotFound(id))?;
        self.invalidate_grouping();

        for load in &network.loads {
            self.load_network.remove(*load);
        }
        for supply in &network.supplies {
            self.supply_network.remove(*supply);
        }
        for battery in &network.battery_loads {
            self.battery_charging.remove(*battery);
        }
        for battery in &network.battery_supplies {
            self.battery_discharging.remove(*battery);
        }
        Ok(network)
    }

    pub fn network(&self, id: NetworkId) -> Option<&Network> {
        self.networks.get(id)
    }

    pub fn networks(&self) -> impl Iterator<Item = (NetworkId, &Network)> {
        self.networks.iter()
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    fn require_network(&self, id: NetworkId) -> Result<(), StateError> {
        if self.networks.contains_key(id) {
            Ok(())
        } else {
            Err(StateError::NetworkNotFound(id))
        }
    }

    // -----------------------------------------------------------------------
    // Loads
    // -----------------------------------------------------------------------

    /// Add a load wired into `network`.
    pub fn add_load(&mut self, network: NetworkId, load: Load) -> Result<LoadId, StateError> {
        self.require_network(network)?;
        let id = self.loads.insert(load);
        self.set_load_network(id, Some(network))?;
        Ok(id)
    }

    /// Rewire a load into another network, or detach it with `None`.
    pub fn set_load_network(
        &mut self,
        id: LoadId,
        network: Option<NetworkId>,
    ) -> Result<(), StateError> {
        if !self.loads.contains_key(id) {
            return Err(StateError::LoadNotFound(id));
        }
        if let Some(net) = network {
            self.require_network(net)?;
        }
        if let Some(old) = self.load_network.remove(id) {
            if let Some(net) = self.networks.get_mut(old) {
                net.loads.retain(|l| *l != id);
            }
        }
        if let Some(net) = network {
            self.networks[net].loads.push(id);
            self.load_network.insert(id, net);
        }
        self.invalidate_grouping();
        Ok(())
    }

    pub fn remove_load(&mut self, id: LoadId) -> Option<Load> {
        if self.loads.contains_key(id) {
            // Detaching a known load cannot fail.
            let _ = self.set_load_network(id, None);
        }
        self.loads.remove(id)
    }

    pub fn load(&self, id: LoadId) -> Option<&Load> {
        self.loads.get(id)
    }

    pub fn load_mut(&mut self, id: LoadId) -> Option<&mut Load> {
        self.loads.get_mut(id)
    }

    pub fn loads(&self) -> impl Iterator<Item = (LoadId, &Load)> {
        self.loads.iter()
    }

    pub fn load_network(&self, id: LoadId) -> Option<NetworkId> {
        self.load_network.get(id).copied()
    }

    // -----------------------------------------------------------------------
    // Supplies
    // -----------------------------------------------------------------------

    /// Add a supply wired into `network`.
    pub fn add_supply(
        &mut self,
        network: NetworkId,
        supply: Supply,
    ) -> Result<SupplyId, StateError> {
        self.require_network(network)?;
        let id = self.supplies.insert(supply);
        self.set_supply_network(id, Some(network))?;
        Ok(id)
    }

    /// Rewire a supply into another network, or detach it with `None`.
    pub fn set_supply_network(
        &mut self,
        id: SupplyId,
        network: Option<NetworkId>,
    ) -> Result<(), StateError> {
        if !self.supplies.contains_key(id) {
            return Err(StateError::SupplyNotFound(id));
        }
        if let Some(net) = network {
            self.require_network(net)?;
        }
        if let Some(old) = self.supply_network.remove(id) {
            if let Some(net) = self.networks.get_mut(old) {
                net.supplies.retain(|s| *s != id);
            }
        }
        if let Some(net) = network {
            self.networks[net].supplies.push(id);
            self.supply_network.insert(id, net);
        }
        self.invalidate_grouping();
        Ok(())
    }

    pub fn remove_supply(&mut self, id: SupplyId) -> Option<Supply> {
        if self.supplies.contains_key(id) {
            let _ = self.set_supply_network(id, None);
        }
        self.supplies.remove(id)
    }

    pub fn supply(&self, id: SupplyId) -> Option<&Supply> {
        self.supplies.get(id)
    }

    pub fn supply_mut(&mut self, id: SupplyId) -> Option<&mut Supply> {
        self.supplies.get_mut(id)
    }

    pub fn supplies(&self) -> impl Iterator<Item = (SupplyId, &Supply)> {
        self.supplies.iter()
    }

    pub fn supply_network(&self, id: SupplyId) -> Option<NetworkId> {
        self.supply_network.get(id).copied()
    }

    // -----------------------------------------------------------------------
    // Batteries
    // -----------------------------------------------------------------------

    /// Add a battery that is not yet wired into any network.
    pub fn add_battery(&mut self, battery: Battery) -> BatteryId {
        self.batteries.insert(battery)
    }

    /// Choose the network this battery charges from, or `None` to stop
    /// charging from any network.
    pub fn set_battery_charging_network(
        &mut self,
        id: BatteryId,
        network: Option<NetworkId>,
    ) -> Result<(), StateError> {
        if !self.batteries.contains_key(id) {
            return Err(StateError::BatteryNotFound(id));
        }
        if let Some(net) = network {
            self.require_network(net)?;
        }
        if let Some(old) = self.battery_charging.remove(id) {
            if let Some(net) = self.networks.get_mut(old) {
                net.battery_loads.retain(|b| *b != id);
            }
        }
        if let Some(net) = network {
            push_unique(&mut self.networks[net].battery_loads, id);
            self.battery_charging.insert(id, net);
        }
        self.invalidate_grouping();
        Ok(())
    }

    /// Choose the network this battery discharges into. This is the edge the
    /// height grouping follows.
    pub fn set_battery_discharging_network(
        &mut self,
        id: BatteryId,
        network: Option<NetworkId>,
    ) -> Result<(), StateError> {
        if !self.batteries.contains_key(id) {
            return Err(StateError::BatteryNotFound(id));
        }
        if let Some(net) = network {
            self.require_network(net)?;
        }
        if let Some(old) = self.battery_discharging.remove(id) {
            if let Some(net) = self.networks.get_mut(old) {
                net.battery_supplies.retain(|b| *b != id);
            }
        }
        if let Some(net) = network {
            push_unique(&mut self.networks[net].battery_supplies, id);
            self.battery_discharging.insert(id, net);
        }
        self.invalidate_grouping();
        Ok(())
    }

    /// Detach a battery from both of its networks.
    pub fn clear_battery_networks(&mut self, id: BatteryId) -> Result<(), StateError> {
        self.set_battery_charging_network(id, None)?;
        self.set_battery_discharging_network(id, None)
    }

    pub fn remove_battery(&mut self, id: BatteryId) -> Option<Battery> {
        if self.batteries.contains_key(id) {
            let _ = self.clear_battery_networks(id);
        }
        self.batteries.remove(id)
    }

    pub fn battery(&self, id: BatteryId) -> Option<&Battery> {
        self.batteries.get(id)
    }

    pub fn battery_mut(&mut self, id: BatteryId) -> Option<&mut Battery> {
        self.batteries.get_mut(id)
    }

    pub fn batteries(&self) -> impl Iterator<Item = (BatteryId, &Battery)> {
        self.batteries.iter()
    }

    /// The network this battery charges from.
    pub fn battery_charging_network(&self, id: BatteryId) -> Option<NetworkId> {
        self.battery_charging.get(id).copied()
    }

    /// The network this battery discharges into.
    pub fn linked_network_discharging(&self, id: BatteryId) -> Option<NetworkId> {
        self.battery_discharging.get(id).copied()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_load_wires_into_network() {
        let mut state = PowerState::new();
        let net = state.add_network();
        let load = state
            .add_load(
                net,
                Load {
                    desired_power: 10.0,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(state.load_network(load), Some(net));
        assert_eq!(state.network(net).unwrap().loads(), &[load]);
    }

    #[test]
    fn add_to_missing_network_fails() {
        let mut state = PowerState::new();
        let net = state.add_network();
        state.remove_network(net).unwrap();

        let err = state.add_supply(net, Supply::default()).unwrap_err();
        assert_eq!(err, StateError::NetworkNotFound(net));
        assert_eq!(
            state.supplies().count(),
            0,
            "failed add must not leak a node"
        );
    }

    #[test]
    fn rewiring_moves_membership() {
        let mut state = PowerState::new();
        let a = state.add_network();
        let b = state.add_network();
        let supply = state.add_supply(a, Supply::default()).unwrap();

        state.set_supply_network(supply, Some(b)).unwrap();

        assert!(state.network(a).unwrap().supplies().is_empty());
        assert_eq!(state.network(b).unwrap().supplies(), &[supply]);
        assert_eq!(state.supply_network(supply), Some(b));
    }

    #[test]
    fn remove_network_detaches_members() {
        let mut state = PowerState::new();
        let a = state.add_network();
        let b = state.add_network();
        let load = state.add_load(a, Load::default()).unwrap();
        let battery = state.add_battery(Battery::default());
        state
            .set_battery_charging_network(battery, Some(b))
            .unwrap();
        state
            .set_battery_discharging_network(battery, Some(a))
            .unwrap();

        state.remove_network(a).unwrap();

        assert!(state.load(load).is_some(), "nodes survive network removal");
        assert_eq!(state.load_network(load), None);
        assert_eq!(state.linked_network_discharging(battery), None);
        assert_eq!(state.battery_charging_network(battery), Some(b));
    }

    #[test]
    fn remove_battery_detaches_from_both_sides() {
        let mut state = PowerState::new();
        let a = state.add_network();
        let b = state.add_network();
        let battery = state.add_battery(Battery::default());
        state
            .set_battery_charging_network(battery, Some(a))
            .unwrap();
        state
            .set_battery_discharging_network(battery, Some(b))
            .unwrap();

        assert!(state.remove_battery(battery).is_some());
        assert!(state.network(a).unwrap().battery_loads().is_empty());
        assert!(state.network(b).unwrap().battery_supplies().is_empty());
        assert!(state.remove_battery(battery).is_none());
    }

    #[test]
    fn battery_taps_are_not_duplicated() {
        let mut state = PowerState::new();
        let net = state.add_network();
        let battery = state.add_battery(Battery::default());

        state
            .set_battery_charging_network(battery, Some(net))
            .unwrap();
        state
            .set_battery_charging_network(battery, Some(net))
            .unwrap();

        assert_eq!(state.network(net).unwrap().battery_loads().len(), 1);
    }

    #[test]
    fn topology_changes_invalidate_grouping() {
        let mut state = PowerState::new();
        let net = state.add_network();
        state.grouped_nets = Some(vec![vec![net]]);

        let battery = state.add_battery(Battery::default());
        assert!(
            !state.is_grouping_stale(),
            "adding an unwired battery is not topology"
        );

        state
            .set_battery_discharging_network(battery, Some(net))
            .unwrap();
        assert!(state.is_grouping_stale());
    }

    #[test]
    fn field_edits_keep_grouping() {
        let mut state = PowerState::new();
        let net = state.add_network();
        let load = state.add_load(net, Load::default()).unwrap();
        state.grouped_nets = Some(vec![vec![net]]);

        state.load_mut(load).unwrap().desired_power = 500.0;

        assert!(!state.is_grouping_stale());
    }

    #[test]
    fn charge_demand_limited_by_space() {
        let battery = Battery {
            capacity: 100.0,
            current_storage: 90.0,
            max_charge_rate: 50.0,
            ..Default::default()
        };
        // Only 10 J of room left over a 1 s tick.
        assert_eq!(battery.charge_demand(1.0), 10.0);
        // Over 0.1 s the same room allows 100 W, capped by the charge rate.
        assert_eq!(battery.charge_demand(0.1), 50.0);
    }

    #[test]
    fn charge_demand_includes_pass_through() {
        let battery = Battery {
            capacity: 1000.0,
            max_charge_rate: 10.0,
            efficiency: 0.5,
            loading_network_demand: 20.0,
            ..Default::default()
        };
        // 10 + 20 / 0.5
        assert_eq!(battery.charge_demand(1.0), 50.0);
    }

    #[test]
    fn zero_efficiency_never_charges() {
        let battery = Battery {
            capacity: 1000.0,
            max_charge_rate: 10.0,
            efficiency: 0.0,
            ..Default::default()
        };
        assert_eq!(battery.charge_demand(1.0), 0.0);
    }
}
