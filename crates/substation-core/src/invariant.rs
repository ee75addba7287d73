//! Power invariants and how violations are surfaced.
//!
//! Inside the solve, a value that goes negative (or storage that leaves
//! `0..=capacity`) by more than float noise is a bug: debug builds panic via
//! `debug_assert!`, release builds log a warning and clamp so gameplay never
//! sees negative power. [`PowerState::validate`] audits a whole state and
//! reports every violation as an [`InvariantViolation`].

use tracing::warn;

use crate::id::{BatteryId, LoadId, SupplyId};
use crate::state::PowerState;

/// Relative tolerance for float noise in invariant checks.
pub const INVARIANT_TOLERANCE: f32 = 1e-4;

/// Allowed absolute error for a quantity of the given magnitude.
pub fn tolerance_for(scale: f32) -> f32 {
    INVARIANT_TOLERANCE * scale.abs().max(1.0)
}

/// A broken power invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("load {load:?}: {field} is negative ({value})")]
    NegativeLoad {
        load: LoadId,
        field: &'static str,
        value: f32,
    },
    #[error("supply {supply:?}: {field} is negative ({value})")]
    NegativeSupply {
        supply: SupplyId,
        field: &'static str,
        value: f32,
    },
    #[error("supply {supply:?}: current supply {current} exceeds available {available}")]
    SupplyAboveAvailable {
        supply: SupplyId,
        current: f32,
        available: f32,
    },
    #[error("supply {supply:?}: available supply {available} exceeds max {max}")]
    AvailableAboveMax {
        supply: SupplyId,
        available: f32,
        max: f32,
    },
    #[error("battery {battery:?}: {field} is negative ({value})")]
    NegativeBattery {
        battery: BatteryId,
        field: &'static str,
        value: f32,
    },
    #[error("battery {battery:?}: storage {storage} outside 0..={capacity}")]
    StorageOutOfRange {
        battery: BatteryId,
        storage: f32,
        capacity: f32,
    },
}

/// Clamp a solver result that must not be negative.
///
/// `scale` is the magnitude of the quantities the value was computed from;
/// errors within [`tolerance_for`] that scale are float noise.
pub(crate) fn guard_non_negative(value: f32, scale: f32, what: &'static str) -> f32 {
    let tolerance = tolerance_for(scale);
    debug_assert!(value >= -tolerance, "{what} went negative: {value}");
    if value < -tolerance {
        warn!(
            target: "substation::solver",
            what,
            value,
            "negative power clamped to zero"
        );
    }
    value.max(0.0)
}

/// Clamp stored energy into `0..=capacity`.
pub(crate) fn guard_storage(storage: f32, capacity: f32) -> f32 {
    let tolerance = tolerance_for(capacity);
    debug_assert!(
        storage >= -tolerance && storage <= capacity + tolerance,
        "battery storage {storage} outside 0..={capacity}"
    );
    if storage < -tolerance || storage > capacity + tolerance {
        warn!(
            target: "substation::solver",
            storage,
            capacity,
            "battery storage clamped into range"
        );
    }
    storage.clamp(0.0, capacity.max(0.0))
}

impl PowerState {
    /// Check every node against the power invariants.
    ///
    /// Returns all violations found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<InvariantViolation>> {
        let mut violations = Vec::new();

        for (load, l) in self.loads() {
            for (field, value) in [
                ("desired_power", l.desired_power),
                ("receiving_power", l.receiving_power),
            ] {
                if value < -tolerance_for(l.desired_power) {
                    violations.push(InvariantViolation::NegativeLoad { load, field, value });
                }
            }
        }

        for (supply, s) in self.supplies() {
            let tolerance = tolerance_for(s.max_supply);
            if s.current_supply < -tolerance {
                violations.push(InvariantViolation::NegativeSupply {
                    supply,
                    field: "current_supply",
                    value: s.current_supply,
                });
            }
            if s.current_supply > s.available_supply + tolerance {
                violations.push(InvariantViolation::SupplyAboveAvailable {
                    supply,
                    current: s.current_supply,
                    available: s.available_supply,
                });
            }
            if s.available_supply > s.max_supply + tolerance {
                violations.push(InvariantViolation::AvailableAboveMax {
                    supply,
                    available: s.available_supply,
                    max: s.max_supply,
                });
            }
        }

        for (battery, b) in self.batteries() {
            let tolerance = tolerance_for(b.capacity.max(b.max_supply));
            if b.current_storage < -tolerance || b.current_storage > b.capacity + tolerance {
                violations.push(InvariantViolation::StorageOutOfRange {
                    battery,
                    storage: b.current_storage,
                    capacity: b.capacity,
                });
            }
            for (field, value) in [
                ("current_supply", b.current_supply),
                ("current_receiving", b.current_receiving),
                ("desired_power", b.desired_power),
            ] {
                if value < -tolerance {
                    violations.push(InvariantViolation::NegativeBattery {
                        battery,
                        field,
                        value,
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
