//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]`.

use crate::id::*;
use crate::state::{Battery, Load, PowerState, Supply};

// ===========================================================================
// Float comparison
// ===========================================================================

/// Relative comparison suitable for solver outputs.
pub fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() <= 1e-4 * a.abs().max(b.abs()).max(1.0)
}

// ===========================================================================
// Node constructors
// ===========================================================================

/// A generator already ramped to full output with no extra slack.
pub fn generator(max_supply: f32) -> Supply {
    Supply {
        max_supply,
        supply_ramp_position: max_supply,
        supply_ramp_tolerance: 0.0,
        ..Default::default()
    }
}

pub fn consumer(desired_power: f32) -> Load {
    Load {
        desired_power,
        ..Default::default()
    }
}

/// A lossless battery whose discharge ramp is fully open. Does not charge
/// unless `max_charge_rate` is raised.
pub fn smes(capacity: f32, storage: f32, max_supply: f32) -> Battery {
    Battery {
        capacity,
        current_storage: storage,
        max_supply,
        supply_ramp_position: max_supply,
        supply_ramp_tolerance: 0.0,
        ..Default::default()
    }
}

// ===========================================================================
// Graph builders
// ===========================================================================

pub fn add_generator(state: &mut PowerState, network: NetworkId, max_supply: f32) -> SupplyId {
    state
        .add_supply(network, generator(max_supply))
        .expect("network exists")
}

pub fn add_consumer(state: &mut PowerState, network: NetworkId, desired_power: f32) -> LoadId {
    state
        .add_load(network, consumer(desired_power))
        .expect("network exists")
}

/// Wire a battery that charges from `from` and discharges into `into`.
pub fn add_bridge(
    state: &mut PowerState,
    from: NetworkId,
    into: NetworkId,
    battery: Battery,
) -> BatteryId {
    let id = state.add_battery(battery);
    state
        .set_battery_charging_network(id, Some(from))
        .expect("network exists");
    state
        .set_battery_discharging_network(id, Some(into))
        .expect("network exists");
    id
}

/// Handles for a station built by [`build_station`].
#[derive(Debug, Clone)]
pub struct Station {
    /// The high-voltage backbone every substation charges from.
    pub backbone: NetworkId,
    pub substations: Vec<NetworkId>,
    pub generators: Vec<SupplyId>,
    pub consumers: Vec<LoadId>,
    pub batteries: Vec<BatteryId>,
}

/// Build a two-height station: a backbone with `generator_count` generators,
/// and `substation_count` substations each fed through a battery and serving
/// `loads_per_substation` consumers.
pub fn build_station(
    generator_count: usize,
    substation_count: usize,
    loads_per_substation: usize,
) -> (PowerState, Station) {
    let mut state = PowerState::new();
    let backbone = state.add_network();

    let generators = (0..generator_count)
        .map(|i| {
            let max_supply = 1000.0 + 250.0 * (i % 4) as f32;
            add_generator(&mut state, backbone, max_supply)
        })
        .collect();

    let mut substations = Vec::with_capacity(substation_count);
    let mut consumers = Vec::with_capacity(substation_count * loads_per_substation);
    let mut batteries = Vec::with_capacity(substation_count);
    for s in 0..substation_count {
        let net = state.add_network();
        for l in 0..loads_per_substation {
            let desired = 50.0 + ((s + l) % 7) as f32 * 25.0;
            consumers.push(add_consumer(&mut state, net, desired));
        }
        let battery = Battery {
            max_charge_rate: 200.0,
            ..smes(50_000.0, 25_000.0, 2000.0)
        };
        batteries.push(add_bridge(&mut state, backbone, net, battery));
        substations.push(net);
    }

    (
        state,
        Station {
            backbone,
            substations,
            generators,
            consumers,
            batteries,
        },
    )
}
