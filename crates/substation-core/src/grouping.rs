//! Ordering networks by battery-discharge dependency.
//!
//! A battery charging from network `A` and discharging into network `B`
//! makes `A` depend on `B`: `A`'s charge demand includes the demand `B`
//! could not meet this tick. So `B` is solved first. Networks are grouped by
//! height; every network in a group only depends on networks in lower groups,
//! which is what lets a group be solved in parallel.
//!
//! Battery cycles (A feeds B feeds A) are broken at the edge that closes the
//! loop during the depth-first walk. The result is deterministic for a given
//! state but is an approximation: one side of the cycle reads values from
//! the previous tick.

use slotmap::SecondaryMap;
use tracing::debug;

use crate::id::NetworkId;
use crate::state::PowerState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done(usize),
}

/// One level of the explicit depth-first stack.
struct Frame {
    network: NetworkId,
    dependencies: Vec<NetworkId>,
    next: usize,
    deepest: Option<usize>,
}

impl Frame {
    fn new(state: &PowerState, network: NetworkId) -> Self {
        Self {
            network,
            dependencies: discharge_dependencies(state, network),
            next: 0,
            deepest: None,
        }
    }

    fn raise(&mut self, height: usize) {
        self.deepest = Some(self.deepest.map_or(height, |d| d.max(height)));
    }
}

/// Networks that `network`'s charging batteries discharge into, excluding
/// itself.
fn discharge_dependencies(state: &PowerState, network: NetworkId) -> Vec<NetworkId> {
    let Some(net) = state.network(network) else {
        return Vec::new();
    };
    net.battery_loads()
        .iter()
        .filter_map(|&battery| state.linked_network_discharging(battery))
        .filter(|&linked| linked != network)
        .filter(|&linked| state.network(linked).is_some())
        .collect()
}

/// Partition every network into height groups, writing each network's
/// height back into the state.
///
/// Index 0 holds networks with no battery-fed dependency. Uses an explicit
/// stack, so arbitrarily long battery chains cannot overflow the call stack.
pub fn group_networks_by_height(state: &mut PowerState) -> Vec<Vec<NetworkId>> {
    let mut visits: SecondaryMap<NetworkId, Visit> = SecondaryMap::new();
    let mut grouped: Vec<Vec<NetworkId>> = Vec::new();
    let roots: Vec<NetworkId> = state.networks.keys().collect();

    for root in roots {
        if visits.contains_key(root) {
            continue;
        }
        visits.insert(root, Visit::InProgress);
        let mut stack = vec![Frame::new(state, root)];

        while let Some(frame) = stack.last_mut() {
            if frame.next < frame.dependencies.len() {
                let dependency = frame.dependencies[frame.next];
                frame.next += 1;
                match visits.get(dependency).copied() {
                    Some(Visit::Done(height)) => frame.raise(height),
                    Some(Visit::InProgress) => {
                        debug!(
                            target: "substation::solver",
                            network = ?frame.network,
                            dependency = ?dependency,
                            "battery discharge cycle broken"
                        );
                    }
                    None => {
                        visits.insert(dependency, Visit::InProgress);
                        stack.push(Frame::new(state, dependency));
                    }
                }
                continue;
            }

            let height = frame.deepest.map_or(0, |d| d + 1);
            let network = frame.network;
            stack.pop();

            visits.insert(network, Visit::Done(height));
            if grouped.len() <= height {
                grouped.resize_with(height + 1, Vec::new);
            }
            grouped[height].push(network);
            if let Some(parent) = stack.last_mut() {
                parent.raise(height);
            }
        }
    }

    for (network, visit) in &visits {
        if let (Visit::Done(height), Some(net)) = (visit, state.networks.get_mut(network)) {
            net.height = Some(*height);
        }
    }

    grouped
}

impl PowerState {
    /// Networks grouped by height, recomputed only if the topology changed
    /// since the last call.
    pub fn grouped_networks(&mut self) -> &[Vec<NetworkId>] {
        self.ensure_grouping();
        self.grouped_nets.as_deref().unwrap_or(&[])
    }

    fn ensure_grouping(&mut self) {
        if self.grouped_nets.is_none() {
            let grouped = group_networks_by_height(self);
            debug!(
                target: "substation::solver",
                networks = self.networks.len(),
                groups = grouped.len(),
                "regrouped power networks by height"
            );
            self.grouped_nets = Some(grouped);
        }
    }

    /// Take the grouping out of the state (computing it if stale) so the
    /// caller can iterate it while mutating the state. Hand it back with
    /// [`restore_grouping`](Self::restore_grouping).
    pub(crate) fn take_grouping(&mut self) -> Vec<Vec<NetworkId>> {
        self.ensure_grouping();
        self.grouped_nets.take().unwrap_or_default()
    }

    pub(crate) fn restore_grouping(&mut self, grouped: Vec<Vec<NetworkId>>) {
        self.grouped_nets = Some(grouped);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
