//! Auto-ranging state machine.
//!
//! [`decide`] is a pure transition function over [`Range`]. Every threshold is
//! compared in the unit the current range measures in (nF for the low
//! network, µF for the high network), and each direction uses the opposite
//! boundary so a reading sitting on a threshold cannot toggle the range.

use core::fmt;

use crate::estimate::Unit;

/// Below this an estimate means no capacitor is attached (nF, or µF scaled down).
pub const LOWER_THRESHOLD: f32 = 0.1;

/// Nanofarad readings at or above this move to the microfarad network.
pub const UPPER_THRESHOLD_NF: f32 = 200.0;

/// Microfarad readings at or above this saturate the meter.
pub const SATURATION_THRESHOLD_UF: f32 = 200.0;

/// Active measurement range.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Range {
    NoCapacitor,
    Nanofarad,
    Microfarad,
    OutOfRange,
}

impl Range {
    /// Scaling network this range routes the probe through.
    #[must_use]
    pub const fn network(self) -> RangeNetwork {
        match self {
            Range::NoCapacitor | Range::Nanofarad => RangeNetwork::Low,
            Range::Microfarad | Range::OutOfRange => RangeNetwork::High,
        }
    }

    /// Unit in which estimates for this range are expressed.
    #[must_use]
    pub const fn unit(self) -> Unit {
        match self.network() {
            RangeNetwork::Low => Unit::Nanofarad,
            RangeNetwork::High => Unit::Microfarad,
        }
    }

    /// Short label used by the diagnostic stream.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Range::NoCapacitor => "no-cap",
            Range::Nanofarad => "nF",
            Range::Microfarad => "uF",
            Range::OutOfRange => "out-of-range",
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Physical scaling network driven by the range-select output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RangeNetwork {
    /// Range-select pin low.
    Low,
    /// Range-select pin high.
    High,
}

impl RangeNetwork {
    /// Returns `true` when the range-select pin must be driven high.
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, RangeNetwork::High)
    }
}

/// Hardware output that routes the probe through the selected network.
pub trait RangeSelect {
    /// Drives the range-select line for `network`.
    fn select(&mut self, network: RangeNetwork);
}

/// Whether the machine follows the estimate or stays pinned.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RangeMode {
    #[default]
    Auto,
    /// Pinned to [`Range::Nanofarad`]; for calibration and debugging only.
    Manual,
}

/// Range change reported to the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RangeTransition {
    pub from: Range,
    pub to: Range,
}

impl RangeTransition {
    /// Returns the network to select when this transition switches networks.
    #[must_use]
    pub const fn network_change(&self) -> Option<RangeNetwork> {
        let from = self.from.network();
        let to = self.to.network();
        if from.is_high() == to.is_high() {
            None
        } else {
            Some(to)
        }
    }
}

/// Next range for `estimate` (expressed in `current`'s unit). Moves at most one step.
#[must_use]
pub fn decide(estimate: f32, current: Range) -> Range {
    match current {
        Range::NoCapacitor if estimate >= LOWER_THRESHOLD => Range::Nanofarad,
        Range::Nanofarad if estimate < LOWER_THRESHOLD => Range::NoCapacitor,
        Range::Nanofarad if estimate >= UPPER_THRESHOLD_NF => Range::Microfarad,
        Range::Microfarad if estimate < LOWER_THRESHOLD => Range::Nanofarad,
        Range::Microfarad if estimate >= SATURATION_THRESHOLD_UF => Range::OutOfRange,
        Range::OutOfRange if estimate < SATURATION_THRESHOLD_UF => Range::Microfarad,
        unchanged => unchanged,
    }
}

/// Owns the active [`Range`]; the only place it is ever mutated.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RangeStateMachine {
    range: Range,
    mode: RangeMode,
}

impl RangeStateMachine {
    /// Creates a machine starting on the nanofarad range.
    #[must_use]
    pub const fn new(mode: RangeMode) -> Self {
        Self::starting_at(Range::Nanofarad, mode)
    }

    /// Creates a machine at an explicit starting range.
    #[must_use]
    pub const fn starting_at(range: Range, mode: RangeMode) -> Self {
        Self { range, mode }
    }

    /// Returns the active range.
    #[must_use]
    pub const fn range(&self) -> Range {
        self.range
    }

    /// Returns the ranging mode.
    #[must_use]
    pub const fn mode(&self) -> RangeMode {
        self.mode
    }

    /// Switches between auto and manual ranging.
    pub fn set_mode(&mut self, mode: RangeMode) {
        self.mode = mode;
    }

    /// Applies one auto-ranging step for `estimate`.
    pub fn update(&mut self, estimate: f32) -> Option<RangeTransition> {
        let next = match self.mode {
            RangeMode::Auto => decide(estimate, self.range),
            RangeMode::Manual => Range::Nanofarad,
        };
        self.force(next)
    }

    /// Moves to `next` without consulting the estimate.
    pub fn force(&mut self, next: Range) -> Option<RangeTransition> {
        if next == self.range {
            return None;
        }

        let transition = RangeTransition {
            from: self.range,
            to: next,
        };
        self.range = next;
        Some(transition)
    }
}

impl Default for RangeStateMachine {
    fn default() -> Self {
        Self::new(RangeMode::Auto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn networks_follow_ranges() {
        assert_eq!(Range::NoCapacitor.network(), RangeNetwork::Low);
        assert_eq!(Range::Nanofarad.network(), RangeNetwork::Low);
        assert_eq!(Range::Microfarad.network(), RangeNetwork::High);
        assert_eq!(Range::OutOfRange.network(), RangeNetwork::High);
    }

    #[test]
    fn nanofarad_band_holds_between_thresholds() {
        assert_eq!(decide(0.1, Range::Nanofarad), Range::Nanofarad);
        assert_eq!(decide(199.9, Range::Nanofarad), Range::Nanofarad);
        assert_eq!(decide(0.09, Range::Nanofarad), Range::NoCapacitor);
        assert_eq!(decide(200.0, Range::Nanofarad), Range::Microfarad);
    }

    #[test]
    fn microfarad_needs_opposite_boundary_to_return() {
        // 0.15 uF sits inside the 100..200 nF band and must not downshift.
        assert_eq!(decide(0.15, Range::Microfarad), Range::Microfarad);
        assert_eq!(decide(0.099, Range::Microfarad), Range::Nanofarad);
    }

    #[test]
    fn saturation_and_release() {
        assert_eq!(decide(250.0, Range::Microfarad), Range::OutOfRange);
        assert_eq!(decide(200.0, Range::OutOfRange), Range::OutOfRange);
        assert_eq!(decide(199.0, Range::OutOfRange), Range::Microfarad);
    }

    #[test]
    fn nan_estimate_keeps_range() {
        for range in [
            Range::NoCapacitor,
            Range::Nanofarad,
            Range::Microfarad,
            Range::OutOfRange,
        ] {
            assert_eq!(decide(f32::NAN, range), range);
        }
    }

    #[test]
    fn manual_mode_pins_nanofarad() {
        let mut machine = RangeStateMachine::starting_at(Range::Microfarad, RangeMode::Manual);
        let transition = machine.update(5_000.0).expect("transition expected");

        assert_eq!(transition.to, Range::Nanofarad);
        assert_eq!(transition.network_change(), Some(RangeNetwork::Low));
        assert_eq!(machine.update(0.0), None);
        assert_eq!(machine.update(1.0e6), None);
        assert_eq!(machine.range(), Range::Nanofarad);
    }

    #[test]
    fn network_change_only_on_network_boundary() {
        let within_low = RangeTransition {
            from: Range::NoCapacitor,
            to: Range::Nanofarad,
        };
        let crossing = RangeTransition {
            from: Range::Nanofarad,
            to: Range::Microfarad,
        };
        let within_high = RangeTransition {
            from: Range::Microfarad,
            to: Range::OutOfRange,
        };

        assert_eq!(within_low.network_change(), None);
        assert_eq!(crossing.network_change(), Some(RangeNetwork::High));
        assert_eq!(within_high.network_change(), None);
    }
}
