use slotmap::new_key_type;

new_key_type! {
    /// Identifies a power consumer in the [`PowerState`](crate::state::PowerState).
    pub struct LoadId;

    /// Identifies a generator.
    pub struct SupplyId;

    /// Identifies a storage node that may charge from one network and
    /// discharge into another.
    pub struct BatteryId;

    /// Identifies a set of directly wired loads, supplies and battery taps.
    pub struct NetworkId;
}
