//! Period → capacitance conversion.

use core::fmt;

use crate::capture::{Micros, period_in_bounds};
use crate::range::Range;

/// Proportionality constant of the RC timing network (nF per µs of period).
pub const OSC_CONSTANT: f32 = 1.443;

/// Divider for ranges measured in nanofarads.
pub const NF_SCALE: f32 = 1.0;

/// Divider for ranges measured in microfarads.
pub const UF_SCALE: f32 = 1000.0;

/// Capacitance unit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Unit {
    Nanofarad,
    Microfarad,
}

impl Unit {
    /// Suffix appended to formatted readings.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Unit::Nanofarad => " nF",
            Unit::Microfarad => " uF",
        }
    }

    /// Bare unit symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Unit::Nanofarad => "nF",
            Unit::Microfarad => "uF",
        }
    }

    /// Divider applied to the raw nanofarad value.
    #[must_use]
    pub const fn scale(self) -> f32 {
        match self {
            Unit::Nanofarad => NF_SCALE,
            Unit::Microfarad => UF_SCALE,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One computed reading; recomputed every poll and never stored.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CapacitanceReading {
    pub magnitude: f32,
    pub unit: Unit,
}

impl CapacitanceReading {
    /// Reading for `period_us` in the unit implied by `range`.
    #[must_use]
    pub fn from_period(period_us: Micros, range: Range) -> Self {
        Self {
            magnitude: estimate(period_us, range),
            unit: range.unit(),
        }
    }
}

/// Converts a period into a magnitude in the unit implied by `range`.
///
/// Returns `0.0` for periods outside the capture bounds; callers treat that
/// as "no data", never as a real reading.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate(period_us: Micros, range: Range) -> f32 {
    if !period_in_bounds(period_us) {
        return 0.0;
    }

    OSC_CONSTANT * period_us as f32 / range.unit().scale()
}
