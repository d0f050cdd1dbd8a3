//! Validated tunable structs (§3.5). Both are small and `Copy`; invalid
//! values are rejected at construction rather than discovered mid-probe, the
//! way the reference engine validates its own small leaf config values
//! inline instead of through a deserialization pipeline.

use crate::error::{CoreError, CoreResult};

/// Knobs governing one hash table's layout. `max_probe_distance` and the
/// load factor together decide `probe_overflow_size` at build time (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableTunables {
    pub max_probe_distance: u8,
    pub load_factor_num: u32,
    pub load_factor_den: u32,
}

impl TableTunables {
    pub fn new(max_probe_distance: u8, load_factor_num: u32, load_factor_den: u32) -> CoreResult<Self> {
        if max_probe_distance == 0 {
            return Err(CoreError::ProbeDistanceOutOfRange { got: max_probe_distance as u32 });
        }
        if load_factor_den == 0 || load_factor_num == 0 || load_factor_num >= load_factor_den {
            return Err(CoreError::LoadFactorOutOfRange { num: load_factor_num, den: load_factor_den });
        }
        Ok(Self { max_probe_distance, load_factor_num, load_factor_den })
    }

    pub(crate) fn with_max_probe_distance(max_probe_distance: u8) -> Self {
        Self { max_probe_distance, ..Self::default() }
    }
}

impl Default for TableTunables {
    fn default() -> Self {
        Self { max_probe_distance: 255, load_factor_num: 3, load_factor_den: 4 }
    }
}

/// Knobs governing the speculation stats aggregator (§4.6, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorTunables {
    /// Generations a static frame's stats may go unreferenced before
    /// `cleanup` destroys them.
    pub max_age: u32,
    pub simstack_initial_capacity: usize,
    pub offset_log_growth_step: usize,
}

impl AggregatorTunables {
    pub fn new(max_age: u32, simstack_initial_capacity: usize, offset_log_growth_step: usize) -> CoreResult<Self> {
        if simstack_initial_capacity == 0 {
            return Err(CoreError::ZeroCapacity);
        }
        Ok(Self { max_age, simstack_initial_capacity, offset_log_growth_step })
    }
}

impl Default for AggregatorTunables {
    fn default() -> Self {
        Self { max_age: 100, simstack_initial_capacity: 32, offset_log_growth_step: 32 }
    }
}
