//! Tunable knobs that don't belong on the wire: capacity-hint heuristics
//! and growth multipliers, collected so callers don't have to thread raw
//! magic numbers through the insertion/import APIs (Design Note "Capacity
//! hints" — the `× 256` heuristic is a performance pessimization knob
//! exposed as a parameter, not baked in).

/// Options controlling how much spare capacity the insertion engine and
/// JSON importer reserve inside newly opened containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarbonOptions {
    /// Bytes of padding reserved per element when the JSON importer opens
    /// a nested array/object container without an explicit capacity hint.
    /// Default 256, matching the heuristic in the format spec.
    pub capacity_hint_multiplier: usize,
    /// Default reserved byte count for a container opened with no
    /// capacity hint and no element count to multiply (e.g. the root).
    pub default_capacity_hint: usize,
}

impl Default for CarbonOptions {
    fn default() -> Self {
        Self {
            capacity_hint_multiplier: 256,
            default_capacity_hint: 256,
        }
    }
}

impl CarbonOptions {
    /// Capacity hint (in bytes) for a container about to hold `num_elems`
    /// elements.
    #[must_use]
    pub fn hint_for(&self, num_elems: usize) -> usize {
        if num_elems == 0 {
            self.default_capacity_hint
        } else {
            num_elems * self.capacity_hint_multiplier
        }
    }
}

/// The mode a record is created/revised with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Leave padding/capacity in place for cheap in-place growth later.
    #[default]
    Default,
    /// Compact: run `pack` + `shrink` before sealing (`create_end`/`revise_end`).
    Optimize,
}
