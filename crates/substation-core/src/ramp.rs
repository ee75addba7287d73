//! Ramp smoothing.
//!
//! The solve decides where each generator and battery *should* be
//! (`supply_ramp_target`); this pass moves the actual ramp position toward
//! it at no more than `supply_ramp_rate` per second, so output changes
//! smoothly across ticks instead of snapping.

use crate::state::PowerState;

/// Deviations at or below this are snapped straight to the target.
pub const DEFAULT_RAMP_SNAP_THRESHOLD: f32 = 0.001;

/// Move `position` toward `target` by at most `max_step`, then clamp into
/// `0..=max`.
fn ramp_toward(position: f32, target: f32, max_step: f32, snap: f32, max: f32) -> f32 {
    let deviation = target - position;
    let next = if deviation.abs() <= snap {
        target
    } else if deviation > 0.0 {
        (position + max_step).min(target)
    } else {
        (position - max_step).max(target)
    };
    next.clamp(0.0, max.max(0.0))
}

/// Advance every unpaused supply and battery ramp by `frame_time` seconds.
/// Disabled nodes drop straight to zero.
pub fn update_ramp_positions(state: &mut PowerState, frame_time: f32, snap_threshold: f32) {
    for supply in state.supplies.values_mut() {
        if supply.paused {
            continue;
        }
        if !supply.enabled {
            supply.supply_ramp_position = 0.0;
            continue;
        }
        supply.supply_ramp_position = ramp_toward(
            supply.supply_ramp_position,
            supply.supply_ramp_target,
            supply.supply_ramp_rate * frame_time,
            snap_threshold,
            supply.max_supply,
        );
    }

    for battery in state.batteries.values_mut() {
        if battery.paused {
            continue;
        }
        if !battery.enabled {
            battery.supply_ramp_position = 0.0;
            continue;
        }
        battery.supply_ramp_position = ramp_toward(
            battery.supply_ramp_position,
            battery.supply_ramp_target,
            battery.supply_ramp_rate * frame_time,
            snap_threshold,
            battery.max_supply,
        );
    }
}
