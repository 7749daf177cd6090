use embassy_stm32::exti::ExtiInput;
use embassy_time::Instant;
use meter_core::capture::{EdgeOutcome, EdgeSource};

use super::{EDGE_GATE, EDGE_TIMER, STALLED, micros};

/// Times rising edges on the oscillator input while capture is armed.
///
/// Runs on the interrupt executor so a busy LCD transfer in the poll loop
/// cannot delay timestamping.
#[embassy_executor::task]
pub async fn run(mut input: ExtiInput<'static>) -> ! {
    let mut gate = &EDGE_GATE;
    loop {
        let epoch = EDGE_GATE.armed().await;
        input.wait_for_rising_edge().await;
        if !EDGE_GATE.accepts(epoch) {
            continue;
        }

        if let EdgeOutcome::Stalled(reason) = EDGE_TIMER.on_edge(micros(Instant::now())) {
            gate.disarm();
            STALLED.signal(reason);
        }
    }
}
