use meter_core::capture::{EdgeOutcome, EdgeSource, EdgeTimer, Micros, NoopEdgeSource, StallReason};
use meter_core::config::MeterConfig;
use meter_core::controller::{Controller, ControllerPhase, PollOutcome, StartupStep};
use meter_core::display::{CharacterDisplay, INSERT_CAPACITOR, OUT_OF_RANGE};
use meter_core::range::{Range, RangeMode, RangeNetwork, RangeSelect};
use meter_core::telemetry::TelemetryEventKind;

/// Two-line screen that keeps what a user would currently see.
#[derive(Default)]
struct Screen {
    lines: [String; 2],
    cursor: usize,
    backlight: bool,
}

impl Screen {
    fn top(&self) -> &str {
        &self.lines[0]
    }
}

impl CharacterDisplay for Screen {
    fn clear(&mut self) {
        self.lines = Default::default();
        self.cursor = 0;
    }

    fn write(&mut self, text: &str) {
        self.lines[self.cursor].push_str(text);
    }

    fn write_at(&mut self, text: &str, line: u8, column: u8) {
        self.cursor = usize::from(line.min(1));
        let target = &mut self.lines[self.cursor];
        while target.len() < usize::from(column) {
            target.push(' ');
        }
        target.truncate(usize::from(column));
        target.push_str(text);
    }

    fn set_backlight(&mut self, enabled: bool) {
        self.backlight = enabled;
    }

    fn backlight(&self) -> bool {
        self.backlight
    }
}

#[derive(Default)]
struct RangePin {
    high: bool,
    writes: usize,
}

impl RangeSelect for RangePin {
    fn select(&mut self, network: RangeNetwork) {
        self.high = network.is_high();
        self.writes += 1;
    }
}

/// Drives `count` edges `period` apart starting at `start`; returns the last timestamp.
fn oscillate(
    timer: &EdgeTimer,
    source: &mut impl EdgeSource,
    start: Micros,
    period: Micros,
    count: u32,
) -> Micros {
    let mut now = start;
    for _ in 0..count {
        if let EdgeOutcome::Stalled(_) = timer.on_edge(now) {
            source.disarm();
        }
        now += period;
    }
    now - period
}

fn running_controller(
    timer: &EdgeTimer,
    source: &mut NoopEdgeSource,
) -> Controller<Screen, RangePin> {
    let mut controller =
        Controller::new(Screen::default(), RangePin::default(), MeterConfig::new());
    controller.begin();
    timer.recover(0, source);
    let now = oscillate(timer, source, 50, 100, 3);
    assert!(matches!(
        controller.startup_attempt(timer, source, now),
        StartupStep::Ready { detected: true, .. }
    ));
    controller
}

#[test]
fn boot_then_first_reading() {
    let timer = EdgeTimer::new();
    let mut source = NoopEdgeSource::new();
    let mut controller = running_controller(&timer, &mut source);

    assert_eq!(controller.phase(), ControllerPhase::Running);
    let outcome = controller.poll(&timer, 1_000_000);
    assert!(matches!(outcome, PollOutcome::Reading { .. }));
    assert_eq!(controller.display().top(), "144.3 nF");
}

#[test]
fn dead_short_shows_insert_capacitor_until_recovered() {
    let timer = EdgeTimer::new();
    let mut source = NoopEdgeSource::new();
    let mut controller = running_controller(&timer, &mut source);

    let now = oscillate(&timer, &mut source, 300, 5, 4);
    assert!(!source.is_armed());
    assert_eq!(
        controller.poll(&timer, now),
        PollOutcome::Stalled(StallReason::TooFast)
    );
    assert_eq!(controller.display().top(), INSERT_CAPACITOR);

    let hold = controller.config().stall_hold();
    let resumed = now + Micros::try_from(hold.as_micros()).expect("hold fits");
    controller.recover(&timer, &mut source, resumed);
    assert!(source.is_armed());

    let now = oscillate(&timer, &mut source, resumed + 100, 100, 2);
    assert!(matches!(
        controller.poll(&timer, now),
        PollOutcome::Reading { .. }
    ));
    assert_eq!(controller.display().top(), "144.3 nF");
}

#[test]
fn saturating_microfarad_reading_shows_out_of_range() {
    let timer = EdgeTimer::new();
    let mut source = NoopEdgeSource::new();
    let mut controller = running_controller(&timer, &mut source);

    // About 500 nF moves the meter onto the high network.
    let now = oscillate(&timer, &mut source, 1_000, 346, 2);
    controller.poll(&timer, now);
    assert_eq!(controller.range(), Range::Microfarad);
    assert!(controller.selector().high);

    // About 250 uF.
    let now = oscillate(&timer, &mut source, now + 173_250, 173_250, 1);
    let outcome = controller.poll(&timer, now);
    assert_eq!(controller.range(), Range::OutOfRange);
    assert_eq!(controller.display().top(), OUT_OF_RANGE);
    let PollOutcome::Reading { record, .. } = outcome else {
        panic!("expected a reading, got {outcome:?}");
    };
    assert_eq!(record.range, Range::OutOfRange);
    assert!(controller.selector().high);
    assert_eq!(controller.selector().writes, 2);
}

#[test]
fn manual_mode_never_leaves_nanofarads() {
    let timer = EdgeTimer::new();
    let mut source = NoopEdgeSource::new();
    let mut controller = Controller::new(
        Screen::default(),
        RangePin::default(),
        MeterConfig::new().with_range_mode(RangeMode::Manual),
    );
    controller.begin();
    timer.recover(0, &mut source);

    let now = oscillate(&timer, &mut source, 10_000, 10_000, 2);
    controller.poll(&timer, now);

    assert_eq!(controller.range(), Range::Nanofarad);
    assert!(!controller.selector().high);
    assert_eq!(controller.display().top(), "14.43 uF");
}

#[test]
fn telemetry_tracks_the_range_change() {
    let timer = EdgeTimer::new();
    let mut source = NoopEdgeSource::new();
    let mut controller = running_controller(&timer, &mut source);

    let now = oscillate(&timer, &mut source, 1_000, 346, 2);
    controller.poll(&timer, now);

    let changed = controller
        .telemetry()
        .oldest_first()
        .filter(|record| matches!(record.event, TelemetryEventKind::RangeChanged(_)))
        .count();
    assert_eq!(changed, 1);
}
