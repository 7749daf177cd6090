//! Telemetry event catalog and the in-memory history shared by firmware and host targets.
//!
//! Every controller decision worth diagnosing (startup attempts, readings,
//! range changes, capture stalls, backlight toggles) is appended to a bounded
//! ring so the emulator can replay it into transcripts and the firmware can
//! mirror it over defmt without allocation.

use core::fmt;

use heapless::HistoryBuf;

use crate::capture::{Micros, StallReason};
use crate::estimate::CapacitanceReading;
use crate::range::{Range, RangeTransition};

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Monotonic identifier assigned to each recorded event.
pub type EventId = u32;

/// Serial diagnostics line emitted for every valid reading.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DiagnosticsRecord {
    pub period_us: Micros,
    pub reading: CapacitanceReading,
    pub range: Range,
}

impl DiagnosticsRecord {
    #[must_use]
    pub const fn new(period_us: Micros, reading: CapacitanceReading, range: Range) -> Self {
        Self {
            period_us,
            reading,
            range,
        }
    }
}

impl fmt::Display for DiagnosticsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Period: {}us, Cap: {:.3} {}",
            self.period_us, self.reading.magnitude, self.reading.unit
        )
    }
}

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    StartupAttempt(u8),
    StartupComplete,
    Reading,
    NoSignal,
    RangeChanged(RangeTransition),
    CaptureStalled(StallReason),
    CaptureRecovered,
    BacklightToggled(bool),
}

impl TelemetryEventKind {
    /// Short stable label used by log sinks.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            TelemetryEventKind::StartupAttempt(_) => "startup-attempt",
            TelemetryEventKind::StartupComplete => "startup-complete",
            TelemetryEventKind::Reading => "reading",
            TelemetryEventKind::NoSignal => "no-signal",
            TelemetryEventKind::RangeChanged(_) => "range-changed",
            TelemetryEventKind::CaptureStalled(_) => "capture-stalled",
            TelemetryEventKind::CaptureRecovered => "capture-recovered",
            TelemetryEventKind::BacklightToggled(_) => "backlight",
        }
    }
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::StartupAttempt(attempt) => {
                write!(f, "startup-attempt {attempt}")
            }
            TelemetryEventKind::RangeChanged(transition) => {
                write!(f, "range-changed {} -> {}", transition.from, transition.to)
            }
            TelemetryEventKind::CaptureStalled(reason) => write!(f, "capture-stalled {reason}"),
            TelemetryEventKind::BacklightToggled(on) => {
                write!(f, "backlight {}", if *on { "on" } else { "off" })
            }
            other => f.write_str(other.label()),
        }
    }
}

/// Extra data attached to a telemetry record.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TelemetryPayload {
    None,
    Reading(DiagnosticsRecord),
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp_us: Micros,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>10}us] {}", self.timestamp_us, self.event)?;
        if let TelemetryPayload::Reading(record) = self.details {
            write!(f, " {record}")?;
        }
        Ok(())
    }
}

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<TelemetryRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> impl Iterator<Item = &TelemetryRecord> + '_ {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a valid reading along with its diagnostics line.
    pub fn record_reading(&mut self, record: DiagnosticsRecord, timestamp_us: Micros) -> EventId {
        self.record(
            TelemetryEventKind::Reading,
            TelemetryPayload::Reading(record),
            timestamp_us,
        )
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        details: TelemetryPayload,
        timestamp_us: Micros,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(TelemetryRecord {
            id,
            timestamp_us,
            event,
            details,
        });
        id
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
