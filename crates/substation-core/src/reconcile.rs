//! End-of-tick battery cleanup.
//!
//! The network solve only writes batteries wired into a network it actually
//! processed. A battery that was disconnected, disabled, or sat on an idle
//! network this tick would otherwise keep last tick's flows.

use crate::state::PowerState;

/// Zero the transient flows of every battery no solve marked this tick, then
/// clear the marks. Paused batteries are left alone.
pub fn reconcile_batteries(state: &mut PowerState) {
    for battery in state.batteries.values_mut() {
        if battery.paused {
            continue;
        }
        if !battery.supplying_marked {
            battery.current_supply = 0.0;
            battery.supply_ramp_target = 0.0;
            battery.loading_network_demand = 0.0;
        }
        if !battery.loading_marked {
            battery.current_receiving = 0.0;
        }
        battery.supplying_marked = false;
        battery.loading_marked = false;
    }
}
