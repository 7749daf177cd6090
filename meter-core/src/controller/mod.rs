//! Startup/running orchestration of the meter.
//!
//! The controller owns the range machine, the display formatter, the button
//! debouncer and the telemetry ring. It never sleeps: the runtime decides when
//! to call [`Controller::startup_attempt`], [`Controller::poll`] and
//! [`Controller::recover`], and waits between them according to
//! [`MeterConfig`].

use crate::button::ButtonDebouncer;
use crate::capture::{EdgeSource, EdgeTimer, Micros, StallReason};
use crate::config::MeterConfig;
use crate::display::{
    CharacterDisplay, DisplayFormatter, DisplayRange, FormattedReading, INSERT_CAPACITOR, STARTING,
};
use crate::estimate::{CapacitanceReading, estimate};
use crate::range::{LOWER_THRESHOLD, Range, RangeMode, RangeSelect, RangeStateMachine};
use crate::telemetry::{
    DiagnosticsRecord, TelemetryEventKind, TelemetryPayload, TelemetryRecorder,
};

/// Top-level controller phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControllerPhase {
    Startup,
    Running,
}

/// Result of one startup attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StartupStep {
    /// No plausible reading yet; wait and try again.
    Retry { attempt: u8 },
    /// Startup finished, either on a plausible reading or on the attempt budget.
    Ready { attempts: u8, detected: bool },
}

/// Result of one running poll cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// A period was available and the display was refreshed.
    Reading {
        record: DiagnosticsRecord,
        shown: FormattedReading,
    },
    /// Capture is armed but fewer than two edges arrived since the last reset.
    NoSignal,
    /// Capture stalled; the caller holds for `stall_hold` and then recovers.
    Stalled(StallReason),
}

/// Meter controller over a display and a range-select output.
pub struct Controller<D, S> {
    display: D,
    selector: S,
    config: MeterConfig,
    phase: ControllerPhase,
    machine: RangeStateMachine,
    formatter: DisplayFormatter,
    button: ButtonDebouncer,
    attempts: u8,
    telemetry: TelemetryRecorder,
}

impl<D, S> Controller<D, S>
where
    D: CharacterDisplay,
    S: RangeSelect,
{
    #[must_use]
    pub fn new(display: D, selector: S, config: MeterConfig) -> Self {
        Self {
            display,
            selector,
            config,
            phase: ControllerPhase::Startup,
            machine: RangeStateMachine::new(config.range_mode()),
            formatter: DisplayFormatter::new(),
            button: ButtonDebouncer::new(config.debounce()),
            attempts: 0,
            telemetry: TelemetryRecorder::new(),
        }
    }

    /// Shows the startup splash and routes the probe to the active network.
    pub fn begin(&mut self) {
        self.phase = ControllerPhase::Startup;
        self.attempts = 0;
        self.display.set_backlight(true);
        self.display.clear();
        self.display.write(STARTING);
        self.selector.select(self.machine.range().network());
    }

    /// Runs one startup attempt against the current capture snapshot.
    ///
    /// A stalled capture is re-armed before the caller waits for the next
    /// attempt.
    pub fn startup_attempt<E>(
        &mut self,
        timer: &EdgeTimer,
        source: &mut E,
        now_us: Micros,
    ) -> StartupStep
    where
        E: EdgeSource + ?Sized,
    {
        self.attempts = self.attempts.saturating_add(1);
        self.display.write(".");
        self.telemetry.record(
            TelemetryEventKind::StartupAttempt(self.attempts),
            TelemetryPayload::None,
            now_us,
        );

        let snapshot = timer.check_silence(now_us);
        let detected = !snapshot.state.is_stalled()
            && snapshot
                .period_us()
                .is_some_and(|period| estimate(period, self.machine.range()) > LOWER_THRESHOLD);

        if detected || self.attempts >= self.config.startup_attempts() {
            self.phase = ControllerPhase::Running;
            self.telemetry.record(
                TelemetryEventKind::StartupComplete,
                TelemetryPayload::None,
                now_us,
            );
            return StartupStep::Ready {
                attempts: self.attempts,
                detected,
            };
        }

        if snapshot.state.is_stalled() {
            timer.recover(now_us, source);
        }
        StartupStep::Retry {
            attempt: self.attempts,
        }
    }

    /// Runs one poll cycle: estimate, range, format, display, log.
    pub fn poll(&mut self, timer: &EdgeTimer, now_us: Micros) -> PollOutcome {
        let snapshot = timer.check_silence(now_us);
        if let Some(reason) = snapshot.state.stall_reason() {
            self.show_stalled(reason, now_us);
            return PollOutcome::Stalled(reason);
        }

        let Some(period_us) = snapshot.period_us() else {
            self.show_message(INSERT_CAPACITOR);
            self.telemetry
                .record(TelemetryEventKind::NoSignal, TelemetryPayload::None, now_us);
            return PollOutcome::NoSignal;
        };

        let magnitude = estimate(period_us, self.machine.range());
        if let Some(transition) = self.machine.update(magnitude) {
            if let Some(network) = transition.network_change() {
                self.selector.select(network);
            }
            self.telemetry.record(
                TelemetryEventKind::RangeChanged(transition),
                TelemetryPayload::None,
                now_us,
            );
        }

        let range = self.machine.range();
        let reading = CapacitanceReading::from_period(period_us, range);
        let shown = self.formatter.format(reading.magnitude, range);
        self.show_message(shown.as_str());

        let record = DiagnosticsRecord::new(period_us, reading, range);
        self.telemetry.record_reading(record, now_us);
        PollOutcome::Reading { record, shown }
    }

    /// Shows the stall message. The caller holds it for `stall_hold`.
    pub fn show_stalled(&mut self, reason: StallReason, now_us: Micros) {
        self.show_message(INSERT_CAPACITOR);
        self.telemetry.record(
            TelemetryEventKind::CaptureStalled(reason),
            TelemetryPayload::None,
            now_us,
        );
    }

    /// Clears a stall and re-arms capture.
    pub fn recover<E>(&mut self, timer: &EdgeTimer, source: &mut E, now_us: Micros)
    where
        E: EdgeSource + ?Sized,
    {
        timer.recover(now_us, source);
        self.telemetry.record(
            TelemetryEventKind::CaptureRecovered,
            TelemetryPayload::None,
            now_us,
        );
    }

    /// Handles a detected button press; returns the new backlight state when
    /// the press was accepted.
    pub fn button_pressed(&mut self, now_us: Micros) -> Option<bool> {
        if !self.button.press(now_us) {
            return None;
        }

        let enabled = !self.display.backlight();
        self.display.set_backlight(enabled);
        self.telemetry.record(
            TelemetryEventKind::BacklightToggled(enabled),
            TelemetryPayload::None,
            now_us,
        );
        Some(enabled)
    }

    /// Switches between auto and manual ranging at runtime.
    pub fn set_range_mode(&mut self, mode: RangeMode) {
        self.machine.set_mode(mode);
    }

    fn show_message(&mut self, text: &str) {
        self.display.clear();
        self.display.write_at(text, 0, 0);
    }

    #[must_use]
    pub const fn phase(&self) -> ControllerPhase {
        self.phase
    }

    #[must_use]
    pub const fn range(&self) -> Range {
        self.machine.range()
    }

    #[must_use]
    pub const fn display_range(&self) -> DisplayRange {
        self.formatter.display_range()
    }

    #[must_use]
    pub const fn config(&self) -> &MeterConfig {
        &self.config
    }

    #[must_use]
    pub fn display(&self) -> &D {
        &self.display
    }

    #[must_use]
    pub fn selector(&self) -> &S {
        &self.selector
    }

    #[must_use]
    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::NoopEdgeSource;
    use crate::range::RangeNetwork;

    #[derive(Default)]
    struct ScreenStub {
        text: String,
        backlight: bool,
    }

    impl CharacterDisplay for ScreenStub {
        fn clear(&mut self) {
            self.text.clear();
        }

        fn write(&mut self, text: &str) {
            self.text.push_str(text);
        }

        fn write_at(&mut self, text: &str, _: u8, _: u8) {
            self.text.push_str(text);
        }

        fn set_backlight(&mut self, enabled: bool) {
            self.backlight = enabled;
        }

        fn backlight(&self) -> bool {
            self.backlight
        }
    }

    #[derive(Default)]
    struct SelectLog(Vec<RangeNetwork>);

    impl RangeSelect for SelectLog {
        fn select(&mut self, network: RangeNetwork) {
            self.0.push(network);
        }
    }

    fn controller() -> Controller<ScreenStub, SelectLog> {
        let mut controller =
            Controller::new(ScreenStub::default(), SelectLog::default(), MeterConfig::new());
        controller.begin();
        controller
    }

    fn feed(timer: &EdgeTimer, start: Micros, period: Micros) -> Micros {
        timer.on_edge(start);
        timer.on_edge(start + period);
        start + period
    }

    #[test]
    fn begin_shows_splash_and_selects_low_network() {
        let controller = controller();
        assert_eq!(controller.display().text, "Starting ");
        assert!(controller.display().backlight());
        assert_eq!(controller.selector().0, [RangeNetwork::Low]);
        assert_eq!(controller.phase(), ControllerPhase::Startup);
    }

    #[test]
    fn startup_finishes_early_on_plausible_reading() {
        let timer = EdgeTimer::new();
        let mut source = NoopEdgeSource::new();
        let mut controller = controller();

        assert_eq!(
            controller.startup_attempt(&timer, &mut source, 0),
            StartupStep::Retry { attempt: 1 }
        );
        let now = feed(&timer, 100, 100);
        assert_eq!(
            controller.startup_attempt(&timer, &mut source, now),
            StartupStep::Ready {
                attempts: 2,
                detected: true
            }
        );
        assert_eq!(controller.display().text, "Starting ..");
        assert_eq!(controller.phase(), ControllerPhase::Running);
    }

    #[test]
    fn startup_gives_up_after_attempt_budget() {
        let timer = EdgeTimer::new();
        let mut source = NoopEdgeSource::new();
        let mut controller = Controller::new(
            ScreenStub::default(),
            SelectLog::default(),
            MeterConfig::new().with_startup_attempts(3),
        );
        controller.begin();

        let mut last = None;
        for step in 0..3 {
            last = Some(controller.startup_attempt(&timer, &mut source, step * 500_000));
        }
        assert_eq!(
            last,
            Some(StartupStep::Ready {
                attempts: 3,
                detected: false
            })
        );
    }

    #[test]
    fn poll_shows_reading_and_logs_diagnostics() {
        let timer = EdgeTimer::new();
        let mut controller = controller();
        let now = feed(&timer, 0, 100);

        let PollOutcome::Reading { record, shown } = controller.poll(&timer, now) else {
            panic!("expected a reading");
        };
        assert_eq!(shown.as_str(), "144.3 nF");
        assert_eq!(record.period_us, 100);
        assert_eq!(controller.display().text, "144.3 nF");
        assert_eq!(
            controller.telemetry().latest().map(|r| r.event),
            Some(TelemetryEventKind::Reading)
        );
    }

    #[test]
    fn stall_takes_priority_and_recovery_rearms() {
        let timer = EdgeTimer::new();
        let mut source = NoopEdgeSource::new();
        let mut controller = controller();
        let now = feed(&timer, 0, 5);

        assert_eq!(
            controller.poll(&timer, now),
            PollOutcome::Stalled(StallReason::TooFast)
        );
        assert_eq!(controller.display().text, INSERT_CAPACITOR);

        controller.recover(&timer, &mut source, now + 1_000_000);
        assert!(source.is_armed());
        assert_eq!(controller.poll(&timer, now + 1_000_001), PollOutcome::NoSignal);
    }

    #[test]
    fn crossing_into_microfarads_switches_network() {
        let timer = EdgeTimer::new();
        let mut controller = controller();
        // 700 us is roughly 1010 nF.
        let now = feed(&timer, 0, 700);

        let PollOutcome::Reading { record, shown } = controller.poll(&timer, now) else {
            panic!("expected a reading");
        };
        assert_eq!(record.range, Range::Microfarad);
        assert_eq!(shown.as_str(), "1.010 uF");
        assert_eq!(
            controller.selector().0,
            [RangeNetwork::Low, RangeNetwork::High]
        );
    }

    #[test]
    fn button_toggles_backlight_with_lockout() {
        let mut controller = controller();
        assert_eq!(controller.button_pressed(0), Some(false));
        assert_eq!(controller.button_pressed(100_000), None);
        assert_eq!(controller.button_pressed(600_000), Some(true));
        assert!(controller.display().backlight());
    }
}
