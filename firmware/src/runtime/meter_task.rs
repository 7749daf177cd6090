use core::time::Duration as StdDuration;

use embassy_futures::select::{Either3, select3};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Blocking;
use embassy_time::{Delay, Duration, Instant, Timer};
use meter_core::capture::EdgeSource;
use meter_core::controller::{Controller, PollOutcome, StartupStep};
use meter_core::lcd::Mcp23017Lcd;

use super::{EDGE_GATE, EDGE_TIMER, STALLED, micros};
use crate::hw::{RangeSelectPin, StatusLed};
use crate::telemetry;

pub type MeterController =
    Controller<Mcp23017Lcd<I2c<'static, Blocking>, Delay>, RangeSelectPin<'static>>;

fn ticks(duration: StdDuration) -> Duration {
    Duration::from_micros(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
}

#[embassy_executor::task]
pub async fn run(
    mut controller: MeterController,
    mut button: ExtiInput<'static>,
    mut led: StatusLed<'static>,
) -> ! {
    let mut gate = &EDGE_GATE;
    let config = *controller.config();
    let interval = ticks(config.poll_interval());
    let hold = ticks(config.stall_hold());

    telemetry::log_boot();
    controller.begin();
    EDGE_TIMER.recover(micros(Instant::now()), &mut gate);

    loop {
        Timer::after(ticks(config.startup_wait())).await;
        let step = controller.startup_attempt(&EDGE_TIMER, &mut gate, micros(Instant::now()));
        telemetry::log_startup(step);
        if matches!(step, StartupStep::Ready { .. }) {
            break;
        }
    }
    led.set_busy(false);
    STALLED.reset();

    let mut holding = false;
    let mut deadline = Instant::now();
    let mut reported_bus_errors = 0;

    loop {
        match select3(
            Timer::at(deadline),
            STALLED.wait(),
            button.wait_for_falling_edge(),
        )
        .await
        {
            Either3::First(()) => {
                let now = Instant::now();
                if holding {
                    holding = false;
                    STALLED.reset();
                    controller.recover(&EDGE_TIMER, &mut gate, micros(now));
                    telemetry::log_recovered();
                    deadline = now + interval;
                    continue;
                }

                let outcome = controller.poll(&EDGE_TIMER, micros(now));
                telemetry::log_poll(&outcome);
                if matches!(outcome, PollOutcome::Stalled(_)) {
                    gate.disarm();
                    holding = true;
                    deadline = now + hold;
                } else {
                    deadline = now + interval;
                }
            }
            Either3::Second(reason) => {
                if !holding {
                    let now = Instant::now();
                    controller.show_stalled(reason, micros(now));
                    telemetry::log_stall(reason);
                    holding = true;
                    deadline = now + hold;
                }
            }
            Either3::Third(()) => {
                if let Some(enabled) = controller.button_pressed(micros(Instant::now())) {
                    telemetry::log_backlight(enabled);
                }
            }
        }

        let bus_errors = controller.display().bus_errors();
        if bus_errors != reported_bus_errors {
            reported_bus_errors = bus_errors;
            telemetry::log_bus_errors(bus_errors);
        }
    }
}
