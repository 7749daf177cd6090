//! Oscillator edge capture and stall detection.
//!
//! [`EdgeTimer`] is the only state shared between the edge handler (which runs
//! at interrupt priority and preempts everything else) and the cooperative poll
//! loop. All of it lives in a single `Copy` register block behind a
//! [`critical_section::Mutex`], so every cross-context access is one short
//! critical section and a torn read of period/timestamp is impossible.
//!
//! The handler side only ever *disarms* capture. Re-arming goes through
//! [`EdgeTimer::recover`], which must be issued from the poll loop.

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;

/// Periods shorter than this mean the oscillator is running too fast to time.
pub const MIN_PERIOD_US: u32 = 20;

/// Periods longer than this mean the oscillator has effectively stopped.
pub const MAX_PERIOD_US: u32 = 1_000_000;

/// Wrapping microsecond timestamp (the width of the MCU `micros()` counter).
pub type Micros = u32;

/// Why capture was suspended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StallReason {
    /// Sub-threshold period: no capacitor, open leads, or a dead short.
    TooFast,
    /// Super-threshold period or no edges at all: huge capacitor or broken probe.
    TooSlow,
}

impl StallReason {
    /// Short label used by the diagnostic stream.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            StallReason::TooFast => "too-fast",
            StallReason::TooSlow => "too-slow",
        }
    }
}

impl fmt::Display for StallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Capture lifecycle observed by the poll loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CaptureState {
    Armed,
    Stalled(StallReason),
}

impl CaptureState {
    /// Returns `true` while capture is suspended pending recovery.
    #[must_use]
    pub const fn is_stalled(self) -> bool {
        matches!(self, CaptureState::Stalled(_))
    }

    /// Returns the stall reason, if any.
    #[must_use]
    pub const fn stall_reason(self) -> Option<StallReason> {
        match self {
            CaptureState::Armed => None,
            CaptureState::Stalled(reason) => Some(reason),
        }
    }
}

/// Classification of a single measured period.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PeriodClass {
    Valid,
    TooFast,
    TooSlow,
}

impl PeriodClass {
    /// Maps an invalid class onto the stall it triggers.
    #[must_use]
    pub const fn stall_reason(self) -> Option<StallReason> {
        match self {
            PeriodClass::Valid => None,
            PeriodClass::TooFast => Some(StallReason::TooFast),
            PeriodClass::TooSlow => Some(StallReason::TooSlow),
        }
    }
}

/// Classifies a period against [`MIN_PERIOD_US`] and [`MAX_PERIOD_US`].
#[must_use]
pub const fn classify(period_us: Micros) -> PeriodClass {
    if period_us < MIN_PERIOD_US {
        PeriodClass::TooFast
    } else if period_us > MAX_PERIOD_US {
        PeriodClass::TooSlow
    } else {
        PeriodClass::Valid
    }
}

/// Returns `true` when `period_us` is usable for an estimate.
#[must_use]
pub const fn period_in_bounds(period_us: Micros) -> bool {
    matches!(classify(period_us), PeriodClass::Valid)
}

/// Latest edge timestamp together with the period it closed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EdgePeriod {
    pub timestamp_us: Micros,
    pub period_us: Micros,
}

/// Result of processing one edge in interrupt context.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EdgeOutcome {
    /// First edge since reset; only the timestamp was recorded.
    Primed,
    /// A valid period was published.
    Accepted(EdgePeriod),
    /// The period was out of bounds; the handler must disarm capture.
    Stalled(StallReason),
    /// Capture is stalled; the edge was dropped until recovery runs.
    Ignored,
}

/// Consistent view of the shared registers taken inside one critical section.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CaptureSnapshot {
    pub latest: Option<EdgePeriod>,
    pub previous_edge_us: Option<Micros>,
    pub state: CaptureState,
}

impl CaptureSnapshot {
    /// Latest published period, if two edges have been seen since the last reset.
    #[must_use]
    pub fn period_us(&self) -> Option<Micros> {
        self.latest.map(|edge| edge.period_us)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct CaptureRegisters {
    previous_edge_us: Option<Micros>,
    latest: Option<EdgePeriod>,
    state: CaptureState,
}

impl CaptureRegisters {
    const RESET: Self = Self {
        previous_edge_us: None,
        latest: None,
        state: CaptureState::Armed,
    };

    const fn snapshot(self) -> CaptureSnapshot {
        CaptureSnapshot {
            latest: self.latest,
            previous_edge_us: self.previous_edge_us,
            state: self.state,
        }
    }
}

/// Arm/disarm control over the hardware edge event.
pub trait EdgeSource {
    /// Enables edge delivery.
    fn arm(&mut self);

    /// Stops edge delivery (used by the handler on a stall).
    fn disarm(&mut self);

    /// Drops any trigger latched before the next [`arm`](EdgeSource::arm).
    fn clear_pending(&mut self);

    /// Reports whether edges are currently delivered.
    fn is_armed(&self) -> bool;
}

/// Edge source that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopEdgeSource {
    armed: bool,
}

impl NoopEdgeSource {
    /// Creates a disarmed no-op source.
    #[must_use]
    pub const fn new() -> Self {
        Self { armed: false }
    }
}

impl EdgeSource for NoopEdgeSource {
    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    fn clear_pending(&mut self) {}

    fn is_armed(&self) -> bool {
        self.armed
    }
}

/// Shared capture registers plus the edge/recovery operations on them.
pub struct EdgeTimer {
    registers: Mutex<Cell<CaptureRegisters>>,
}

impl EdgeTimer {
    /// Creates a timer with no edges observed; usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registers: Mutex::new(Cell::new(CaptureRegisters::RESET)),
        }
    }

    /// Records an edge at `now_us`. Called from the edge handler only.
    ///
    /// Bounded work: one subtraction, one classification, one store. When the
    /// outcome is [`EdgeOutcome::Stalled`] the caller disarms its edge source.
    pub fn on_edge(&self, now_us: Micros) -> EdgeOutcome {
        critical_section::with(|cs| {
            let cell = self.registers.borrow(cs);
            let mut regs = cell.get();

            if regs.state.is_stalled() {
                return EdgeOutcome::Ignored;
            }

            let Some(previous) = regs.previous_edge_us else {
                regs.previous_edge_us = Some(now_us);
                cell.set(regs);
                return EdgeOutcome::Primed;
            };

            let edge = EdgePeriod {
                timestamp_us: now_us,
                period_us: now_us.wrapping_sub(previous),
            };
            regs.previous_edge_us = Some(now_us);
            regs.latest = Some(edge);

            let outcome = match classify(edge.period_us).stall_reason() {
                Some(reason) => {
                    regs.state = CaptureState::Stalled(reason);
                    EdgeOutcome::Stalled(reason)
                }
                None => EdgeOutcome::Accepted(edge),
            };
            cell.set(regs);
            outcome
        })
    }

    /// Returns an atomic copy of the shared registers.
    #[must_use]
    pub fn snapshot(&self) -> CaptureSnapshot {
        critical_section::with(|cs| self.registers.borrow(cs).get().snapshot())
    }

    /// Snapshot that also flags a silent oscillator as [`StallReason::TooSlow`].
    ///
    /// An oscillator that stops outright never delivers the closing edge that
    /// [`on_edge`](Self::on_edge) would classify, so the poll loop checks the
    /// age of the previous edge against [`MAX_PERIOD_US`] instead.
    pub fn check_silence(&self, now_us: Micros) -> CaptureSnapshot {
        critical_section::with(|cs| {
            let cell = self.registers.borrow(cs);
            let mut regs = cell.get();

            if let (CaptureState::Armed, Some(previous)) = (regs.state, regs.previous_edge_us)
                && now_us.wrapping_sub(previous) > MAX_PERIOD_US
            {
                regs.state = CaptureState::Stalled(StallReason::TooSlow);
                cell.set(regs);
            }

            regs.snapshot()
        })
    }

    /// Clears the stall and re-arms capture. Poll-loop context only.
    ///
    /// The previous-edge timestamp is seeded with `now_us` so the first period
    /// after recovery is not measured against a stale edge, and the published
    /// period is dropped so it cannot be read twice. Safe to call repeatedly.
    pub fn recover<S>(&self, now_us: Micros, source: &mut S)
    where
        S: EdgeSource + ?Sized,
    {
        source.clear_pending();
        critical_section::with(|cs| {
            self.registers.borrow(cs).set(CaptureRegisters {
                previous_edge_us: Some(now_us),
                latest: None,
                state: CaptureState::Armed,
            });
        });
        source.arm();
    }
}

impl Default for EdgeTimer {
    fn default() -> Self {
        Self::new()
    }
}
