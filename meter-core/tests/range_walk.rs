use meter_core::range::{
    LOWER_THRESHOLD, Range, RangeMode, RangeNetwork, RangeStateMachine, UPPER_THRESHOLD_NF, decide,
};

/// Feeds the machine an increasing sequence of capacitances (in nF), each
/// re-expressed in the unit of the range active at that moment.
fn walk(machine: &mut RangeStateMachine, nanofarads: &[f32]) -> Vec<Range> {
    let mut visited = vec![machine.range()];
    for &value in nanofarads {
        let estimate = value / machine.range().unit().scale();
        if machine.update(estimate).is_some() {
            visited.push(machine.range());
        }
    }
    visited
}

#[test]
fn increasing_estimates_visit_every_range_in_order() {
    let mut machine = RangeStateMachine::starting_at(Range::NoCapacitor, RangeMode::Auto);
    let sweep = [0.01, 0.05, 0.5, 50.0, 150.0, 250.0, 5_000.0, 150_000.0, 250_000.0, 1.0e6];

    assert_eq!(
        walk(&mut machine, &sweep),
        [
            Range::NoCapacitor,
            Range::Nanofarad,
            Range::Microfarad,
            Range::OutOfRange,
        ]
    );
}

#[test]
fn a_single_large_jump_moves_only_one_step() {
    assert_eq!(decide(1.0e9, Range::NoCapacitor), Range::Nanofarad);
    assert_eq!(decide(1.0e9, Range::Nanofarad), Range::Microfarad);
    assert_eq!(decide(0.0, Range::OutOfRange), Range::Microfarad);
}

#[test]
fn falling_estimates_walk_back_down() {
    let mut machine = RangeStateMachine::starting_at(Range::OutOfRange, RangeMode::Auto);

    assert_eq!(machine.update(150.0).map(|t| t.to), Some(Range::Microfarad));
    assert_eq!(machine.update(0.05).map(|t| t.to), Some(Range::Nanofarad));
    assert_eq!(machine.update(0.05).map(|t| t.to), Some(Range::NoCapacitor));
    assert_eq!(machine.update(0.05), None);
}

#[test]
fn network_changes_only_when_crossing_the_nanofarad_boundary() {
    let mut machine = RangeStateMachine::starting_at(Range::NoCapacitor, RangeMode::Auto);
    let mut networks = Vec::new();

    for estimate in [LOWER_THRESHOLD, UPPER_THRESHOLD_NF, 250.0, 150.0, 0.05] {
        if let Some(network) = machine.update(estimate).and_then(|t| t.network_change()) {
            networks.push(network);
        }
    }

    assert_eq!(networks, [RangeNetwork::High, RangeNetwork::Low]);
}
