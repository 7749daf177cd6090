//! Reading formatter and the character-display collaborator contract.
//!
//! The displayed unit has its own hysteresis, kept separate from
//! [`Range`](crate::range::Range), so a range flicker does not necessarily
//! relabel the screen.

use core::fmt::Write as _;

use heapless::String;

use crate::estimate::Unit;
use crate::range::Range;

/// Message shown while no usable reading is available.
pub const INSERT_CAPACITOR: &str = "Insert capacitor";

/// Message shown while the meter is saturated.
pub const OUT_OF_RANGE: &str = "Out of range";

/// Splash shown while the startup attempts run.
pub const STARTING: &str = "Starting ";

/// Readings below this are treated as "no capacitor" by the formatter.
pub const MIN_DISPLAY_MAGNITUDE: f32 = 0.1;

/// Columns on one line of the character display.
pub const DISPLAY_COLUMNS: usize = 16;

/// Capacity of a rendered reading (longest value is well inside this).
pub const TEXT_CAPACITY: usize = 24;

/// Rendered display text.
pub type ReadingText = String<TEXT_CAPACITY>;

/// Unit label state persisted by the formatter between cycles.
pub type DisplayRange = Unit;

/// Character display driven by the controller.
///
/// Operations have no return codes: a display that initialised successfully
/// is assumed to keep working, and implementations absorb transient faults.
pub trait CharacterDisplay {
    /// Clears the screen and homes the cursor.
    fn clear(&mut self);

    /// Writes `text` at the current cursor position.
    fn write(&mut self, text: &str);

    /// Moves to `line` (0 or 1) and `column`, then writes `text`.
    fn write_at(&mut self, text: &str, line: u8, column: u8);

    /// Switches the backlight.
    fn set_backlight(&mut self, enabled: bool);

    /// Returns the current backlight state.
    fn backlight(&self) -> bool;
}

/// What the formatter decided to show.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormattedReading {
    InsertCapacitor,
    OutOfRange,
    Value { text: ReadingText, unit: Unit },
}

impl FormattedReading {
    /// Text to push to the display.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            FormattedReading::InsertCapacitor => INSERT_CAPACITOR,
            FormattedReading::OutOfRange => OUT_OF_RANGE,
            FormattedReading::Value { text, .. } => text.as_str(),
        }
    }
}

/// Decides the label and text for one reading.
///
/// `magnitude` is expressed in `range`'s unit. Returns the formatted reading
/// together with the display range to persist for the next cycle.
#[must_use]
pub fn format_reading(
    magnitude: f32,
    range: Range,
    prior: DisplayRange,
) -> (FormattedReading, DisplayRange) {
    if range == Range::NoCapacitor || magnitude.is_nan() || magnitude < MIN_DISPLAY_MAGNITUDE {
        return (FormattedReading::InsertCapacitor, prior);
    }
    if range == Range::OutOfRange {
        return (FormattedReading::OutOfRange, prior);
    }

    let active = range.unit();
    let (value, unit) = if magnitude >= 1000.0
        && (prior == Unit::Nanofarad || active == Unit::Nanofarad)
    {
        (magnitude / 1000.0, Unit::Microfarad)
    } else if magnitude < 1.0 && (prior == Unit::Microfarad || active == Unit::Microfarad) {
        (magnitude * 1000.0, Unit::Nanofarad)
    } else {
        (magnitude, active)
    };

    match render(value, unit) {
        Some(text) => (FormattedReading::Value { text, unit }, unit),
        None => (FormattedReading::OutOfRange, prior),
    }
}

/// Applies the precision policy and appends the unit suffix.
fn render(value: f32, unit: Unit) -> Option<ReadingText> {
    let mut text = ReadingText::new();
    let written = if value >= 100.0 {
        write!(text, "{value:.1}")
    } else if value >= 10.0 {
        write!(text, "{value:.2}")
    } else {
        write!(text, "{value:.3}")
    };
    written.ok()?;
    text.write_str(unit.suffix()).ok()?;
    Some(text)
}

/// Stateful wrapper that keeps the display range between cycles.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DisplayFormatter {
    display_range: DisplayRange,
}

impl DisplayFormatter {
    /// Creates a formatter labelling in nanofarads.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            display_range: Unit::Nanofarad,
        }
    }

    /// Returns the persisted display range.
    #[must_use]
    pub const fn display_range(&self) -> DisplayRange {
        self.display_range
    }

    /// Formats a reading and persists the resulting display range.
    pub fn format(&mut self, magnitude: f32, range: Range) -> FormattedReading {
        let (reading, next) = format_reading(magnitude, range, self.display_range);
        self.display_range = next;
        reading
    }
}

impl Default for DisplayFormatter {
    fn default() -> Self {
        Self::new()
    }
}
