use meter_core::capture::{
    CaptureState, EdgeOutcome, EdgeSource, EdgeTimer, MAX_PERIOD_US, NoopEdgeSource, StallReason,
};

/// Edge source that counts the calls the recovery path makes.
#[derive(Default)]
struct CountingSource {
    armed: bool,
    arms: u32,
    disarms: u32,
    cleared: u32,
}

impl EdgeSource for CountingSource {
    fn arm(&mut self) {
        self.armed = true;
        self.arms += 1;
    }

    fn disarm(&mut self) {
        self.armed = false;
        self.disarms += 1;
    }

    fn clear_pending(&mut self) {
        self.cleared += 1;
    }

    fn is_armed(&self) -> bool {
        self.armed
    }
}

#[test]
fn five_microsecond_period_stalls_too_fast() {
    let timer = EdgeTimer::new();
    let mut source = CountingSource::default();
    source.arm();

    assert_eq!(timer.on_edge(1_000), EdgeOutcome::Primed);
    let outcome = timer.on_edge(1_005);
    assert_eq!(outcome, EdgeOutcome::Stalled(StallReason::TooFast));
    if let EdgeOutcome::Stalled(_) = outcome {
        source.disarm();
    }

    assert!(!source.is_armed());
    assert_eq!(
        timer.snapshot().state,
        CaptureState::Stalled(StallReason::TooFast)
    );
}

#[test]
fn edges_after_a_stall_are_ignored_until_recovery() {
    let timer = EdgeTimer::new();
    timer.on_edge(0);
    timer.on_edge(5);

    assert_eq!(timer.on_edge(500), EdgeOutcome::Ignored);
    assert_eq!(timer.snapshot().period_us(), Some(5));
}

#[test]
fn recovering_twice_leaves_capture_armed_without_a_period() {
    let timer = EdgeTimer::new();
    let mut source = CountingSource::default();
    timer.on_edge(0);
    timer.on_edge(5);

    timer.recover(10_000, &mut source);
    timer.recover(10_050, &mut source);

    let snapshot = timer.snapshot();
    assert_eq!(snapshot.state, CaptureState::Armed);
    assert_eq!(snapshot.period_us(), None);
    assert_eq!(snapshot.previous_edge_us, Some(10_050));
    assert_eq!((source.arms, source.cleared), (2, 2));
    assert!(source.is_armed());
}

#[test]
fn first_period_after_recovery_is_measured_from_the_seed() {
    let timer = EdgeTimer::new();
    let mut source = NoopEdgeSource::new();
    timer.on_edge(0);
    timer.on_edge(5);
    timer.recover(2_000_000, &mut source);

    assert_eq!(
        timer.on_edge(2_000_100),
        EdgeOutcome::Accepted(meter_core::capture::EdgePeriod {
            timestamp_us: 2_000_100,
            period_us: 100,
        })
    );
}

#[test]
fn silent_oscillator_after_recovery_stalls_too_slow() {
    let timer = EdgeTimer::new();
    let mut source = NoopEdgeSource::new();
    timer.recover(0, &mut source);

    assert_eq!(timer.check_silence(MAX_PERIOD_US).state, CaptureState::Armed);
    assert_eq!(
        timer.check_silence(MAX_PERIOD_US + 1).state,
        CaptureState::Stalled(StallReason::TooSlow)
    );
}

#[test]
fn repeated_recovery_with_no_capacitor_never_accumulates_state() {
    let timer = EdgeTimer::new();
    let mut source = CountingSource::default();
    let mut now = 0u32;
    timer.recover(now, &mut source);

    for _ in 0..50 {
        now = now.wrapping_add(MAX_PERIOD_US + 1);
        let snapshot = timer.check_silence(now);
        if snapshot.state.is_stalled() {
            timer.recover(now, &mut source);
        }
    }

    assert_eq!(timer.snapshot().state, CaptureState::Armed);
    assert_eq!(timer.snapshot().period_us(), None);
    assert_eq!(source.arms, 51);
}
