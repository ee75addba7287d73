//! Headless power grid scenarios.
//!
//! Each test builds a small grid through the public `PowerState` API, runs
//! the solver for a number of ticks, and checks what a player would see:
//! loads served, batteries filling and draining, generators ramping.

use substation_core::config::SolverConfig;
use substation_core::id::*;
use substation_core::solver::{BatteryRampPegSolver, PowerSolver};
use substation_core::state::{Battery, PowerState, Supply};
use substation_core::test_utils::*;

fn solver() -> BatteryRampPegSolver {
    BatteryRampPegSolver::with_config(SolverConfig::sequential())
}

// ===========================================================================
// Single-network scenarios
// ===========================================================================

#[test]
fn generator_feeds_consumer_directly() {
    let mut state = PowerState::new();
    let n1 = state.add_network();
    let s1 = state
        .add_supply(
            n1,
            Supply {
                max_supply: 100.0,
                supply_ramp_position: 100.0,
                supply_ramp_tolerance: 0.0,
                ..Default::default()
            },
        )
        .unwrap();
    let l1 = add_consumer(&mut state, n1, 60.0);

    solver().tick(1.0, &mut state, 1);

    assert_eq!(state.load(l1).unwrap().receiving_power, 60.0);
    let s = state.supply(s1).unwrap();
    assert_eq!(s.current_supply, 60.0);
    assert_eq!(s.supply_ramp_target, 60.0);
}

#[test]
fn brownout_shares_power_evenly() {
    let mut state = PowerState::new();
    let n1 = state.add_network();
    add_generator(&mut state, n1, 50.0);
    let l1 = add_consumer(&mut state, n1, 60.0);
    let l2 = add_consumer(&mut state, n1, 40.0);

    solver().tick(1.0, &mut state, 1);

    assert_eq!(state.load(l1).unwrap().receiving_power, 30.0);
    assert_eq!(state.load(l2).unwrap().receiving_power, 20.0);
}

#[test]
fn battery_covers_the_shortfall() {
    let mut state = PowerState::new();
    let n1 = state.add_network();
    add_generator(&mut state, n1, 30.0);
    let l1 = add_consumer(&mut state, n1, 50.0);
    let b1 = state.add_battery(Battery {
        capacity: 1000.0,
        current_storage: 100.0,
        max_supply: 100.0,
        efficiency: 1.0,
        ..Default::default()
    });
    state.set_battery_discharging_network(b1, Some(n1)).unwrap();

    solver().tick(1.0, &mut state, 1);

    assert_eq!(state.load(l1).unwrap().receiving_power, 50.0);
    assert_eq!(state.battery(b1).unwrap().current_storage, 80.0);
}

#[test]
fn empty_network_tick_is_idempotent() {
    let mut state = PowerState::new();
    state.add_network();
    state.grouped_networks();
    let before = state.serialize().unwrap();

    solver().tick(1.0, &mut state, 1);

    assert_eq!(state.serialize().unwrap(), before);
}

#[test]
fn generator_ramps_up_over_several_ticks() {
    let mut state = PowerState::new();
    let net = state.add_network();
    let generator = state
        .add_supply(
            net,
            Supply {
                max_supply: 1000.0,
                supply_ramp_rate: 100.0,
                supply_ramp_tolerance: 10.0,
                ..Default::default()
            },
        )
        .unwrap();
    let load = add_consumer(&mut state, net, 250.0);
    let mut solver = solver();

    // Cold start: only the tolerance is available until the ramp moves.
    let mut served = Vec::new();
    for _ in 0..4 {
        solver.tick(1.0, &mut state, 1);
        served.push(state.load(load).unwrap().receiving_power);
    }
    assert_eq!(served, vec![10.0, 110.0, 210.0, 250.0]);
    assert_eq!(state.supply(generator).unwrap().supply_ramp_position, 250.0);
}

// ===========================================================================
// Multi-network scenarios
// ===========================================================================

#[test]
fn fed_network_is_solved_before_its_feeder() {
    let mut state = PowerState::new();
    let a = state.add_network();
    let b = state.add_network();
    add_generator(&mut state, a, 500.0);
    add_consumer(&mut state, b, 100.0);
    add_bridge(
        &mut state,
        a,
        b,
        Battery {
            max_charge_rate: 50.0,
            ..smes(1000.0, 500.0, 200.0)
        },
    );

    let groups = state.grouped_networks().to_vec();
    let height_of = |net: NetworkId| groups.iter().position(|g| g.contains(&net));
    assert!(height_of(b) < height_of(a));
    assert_eq!(state.network(b).unwrap().height(), Some(0));
    assert_eq!(state.network(a).unwrap().height(), Some(1));
}

#[test]
fn feeder_recharges_what_the_substation_drew() {
    let mut state = PowerState::new();
    let feeder = state.add_network();
    let sub = state.add_network();
    add_generator(&mut state, feeder, 1000.0);
    let load = add_consumer(&mut state, sub, 80.0);
    let battery = add_bridge(
        &mut state,
        feeder,
        sub,
        Battery {
            max_charge_rate: 0.0,
            ..smes(1000.0, 500.0, 200.0)
        },
    );

    solver().tick(1.0, &mut state, 1);

    // The substation drew 80 from storage, and the feeder's charge demand
    // was raised by the same unmet amount.
    let b = state.battery(battery).unwrap();
    assert_eq!(state.load(load).unwrap().receiving_power, 80.0);
    assert_eq!(b.current_supply, 80.0);
    assert_eq!(b.desired_power, 80.0);
    assert_eq!(b.current_receiving, 80.0);
    assert_eq!(b.current_storage, 500.0);
}

#[test]
fn chain_of_substations_stays_served() {
    let mut state = PowerState::new();
    let networks: Vec<NetworkId> = (0..5).map(|_| state.add_network()).collect();
    add_generator(&mut state, networks[0], 10_000.0);
    let mut loads = Vec::new();
    for pair in networks.windows(2) {
        loads.push(add_consumer(&mut state, pair[1], 100.0));
        add_bridge(
            &mut state,
            pair[0],
            pair[1],
            Battery {
                max_charge_rate: 10.0,
                ..smes(5000.0, 2500.0, 1000.0)
            },
        );
    }
    let mut solver = solver();

    for _ in 0..10 {
        solver.tick(0.25, &mut state, 1);
        for &load in &loads {
            assert!(approx_eq(state.load(load).unwrap().receiving_power, 100.0));
        }
        assert_eq!(state.validate(), Ok(()));
    }

    let heights: Vec<_> = networks
        .iter()
        .map(|&n| state.network(n).unwrap().height())
        .collect();
    assert_eq!(heights, vec![Some(4), Some(3), Some(2), Some(1), Some(0)]);
}

#[test]
fn battery_cycle_is_solved_without_panicking() {
    let mut state = PowerState::new();
    let a = state.add_network();
    let b = state.add_network();
    add_generator(&mut state, a, 100.0);
    add_consumer(&mut state, a, 50.0);
    add_consumer(&mut state, b, 50.0);
    let battery = Battery {
        max_charge_rate: 20.0,
        ..smes(1000.0, 500.0, 100.0)
    };
    add_bridge(&mut state, a, b, battery);
    add_bridge(&mut state, b, a, battery);
    let mut solver = solver();

    for _ in 0..5 {
        solver.tick(1.0, &mut state, 2);
    }

    assert_eq!(state.validate(), Ok(()));
    let groups = state.grouped_networks();
    assert_eq!(groups.len(), 2);
}

// ===========================================================================
// Battery round trips
// ===========================================================================

/// Charge a battery from a generator for `ticks` seconds at 50 W, then
/// discharge it into a 50 W load until empty. Returns the energy drawn from
/// the grid, the energy delivered to the load, and the final storage.
fn round_trip(efficiency: f32, ticks: usize) -> (f32, f32, f32) {
    let mut state = PowerState::new();
    let grid = state.add_network();
    let outlet = state.add_network();
    add_generator(&mut state, grid, 1000.0);
    let load = add_consumer(&mut state, outlet, 50.0);
    let battery = state.add_battery(Battery {
        capacity: 1000.0,
        max_supply: 100.0,
        max_charge_rate: 50.0,
        efficiency,
        ..Default::default()
    });
    state
        .set_battery_charging_network(battery, Some(grid))
        .unwrap();
    let mut solver = solver();

    let mut drawn = 0.0;
    for _ in 0..ticks {
        solver.tick(1.0, &mut state, 1);
        drawn += state.battery(battery).unwrap().current_receiving;
    }

    state.clear_battery_networks(battery).unwrap();
    state
        .set_battery_discharging_network(battery, Some(outlet))
        .unwrap();

    let mut delivered = 0.0;
    for _ in 0..ticks * 2 {
        solver.tick(1.0, &mut state, 1);
        delivered += state.load(load).unwrap().receiving_power;
    }

    (drawn, delivered, state.battery(battery).unwrap().current_storage)
}

#[test]
fn lossless_round_trip_returns_everything() {
    let (drawn, delivered, storage) = round_trip(1.0, 4);

    assert!(approx_eq(drawn, 200.0));
    assert!(approx_eq(delivered, drawn));
    assert!(approx_eq(storage, 0.0));
}

#[test]
fn lossy_round_trip_loses_charge_energy() {
    let (drawn, delivered, storage) = round_trip(0.8, 4);

    assert!(approx_eq(drawn, 200.0));
    assert!(approx_eq(delivered, 160.0));
    assert!(delivered <= drawn);
    assert!(approx_eq(storage, 0.0));
}

// ===========================================================================
// Snapshots and parallelism
// ===========================================================================

#[test]
fn restored_snapshot_continues_identically() {
    let (mut state, _) = build_station(3, 12, 4);
    let mut solver = solver();
    for _ in 0..3 {
        solver.tick(0.5, &mut state, 1);
    }

    let mut restored = PowerState::deserialize(&state.serialize().unwrap()).unwrap();
    for _ in 0..3 {
        solver.tick(0.5, &mut state, 1);
        solver.tick(0.5, &mut restored, 1);
    }

    assert_eq!(state.serialize().unwrap(), restored.serialize().unwrap());
}

#[test]
fn large_station_parallel_matches_sequential() {
    let (mut seq_state, station) = build_station(8, 64, 6);
    let mut par_state = seq_state.clone();
    let mut seq = solver();
    let mut par = BatteryRampPegSolver::new();

    for _ in 0..5 {
        seq.tick(0.1, &mut seq_state, 1);
        par.tick(0.1, &mut par_state, 8);
    }

    for &load in &station.consumers {
        assert_eq!(
            seq_state.load(load).unwrap().receiving_power,
            par_state.load(load).unwrap().receiving_power
        );
    }
    assert_eq!(
        seq_state.serialize().unwrap(),
        par_state.serialize().unwrap()
    );

    let profile = par.last_profile().unwrap();
    assert_eq!(profile.groups, 2);
    assert_eq!(profile.networks, 65);
}
