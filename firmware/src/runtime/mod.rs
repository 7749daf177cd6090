use cortex_m::interrupt as cpu_interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_stm32::i2c::I2c;
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::time::Hertz;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Delay, Instant, Timer};
use meter_core::capture::{EdgeTimer, Micros, StallReason};
use meter_core::config::MeterConfig;
use meter_core::controller::Controller;
use meter_core::lcd::Mcp23017Lcd;

use crate::hw::{EdgeGate, RangeSelectPin, StatusLed};

mod edge_task;
mod meter_task;

const I2C_FREQUENCY: Hertz = Hertz(100_000);
const EXPANDER_RESET_MS: u64 = 100;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        cpu_interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                cpu_interrupt::enable();
            }
        }
    }
}

/// Capture registers shared by the edge task and the poll loop.
pub(super) static EDGE_TIMER: EdgeTimer = EdgeTimer::new();
pub(super) static EDGE_GATE: EdgeGate = EdgeGate::new();
/// Raised by the edge task when an edge lands outside the period bounds.
pub(super) static STALLED: Signal<CriticalSectionRawMutex, StallReason> = Signal::new();

static EXECUTOR_EDGE: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn USART3_4_5_6_LPUART1() {
    unsafe { EXECUTOR_EDGE.on_interrupt() }
}

/// Truncates the embassy clock to the wrapping microsecond counter the core
/// expects.
#[allow(clippy::cast_possible_truncation)]
pub(super) fn micros(at: Instant) -> Micros {
    at.as_micros() as Micros
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA4,
        PA5,
        PA6,
        PB8,
        PB9,
        I2C1,
        EXTI0,
        EXTI4,
        ..
    } = hal::init(config);

    let mut led = StatusLed::new(Output::new(PA5, Level::High, Speed::Low));
    led.set_busy(true);
    let selector = RangeSelectPin::new(Output::new(PA1, Level::Low, Speed::Low));

    let mut expander_reset = Output::new(PA6, Level::Low, Speed::Low);
    Timer::after_millis(EXPANDER_RESET_MS).await;
    expander_reset.set_high();

    let i2c = I2c::new_blocking(I2C1, PB8, PB9, I2C_FREQUENCY, Default::default());
    let mut lcd = Mcp23017Lcd::new(i2c, Delay);
    if let Err(err) = lcd.init() {
        defmt::error!("lcd: {}", defmt::Debug2Format(&err));
        core::future::pending::<()>().await;
    }

    let oscillator = ExtiInput::new(PA0, EXTI0, Pull::None);
    let button = ExtiInput::new(PA4, EXTI4, Pull::Up);

    interrupt::USART3_4_5_6_LPUART1.set_priority(Priority::P1);
    let edge_spawner = EXECUTOR_EDGE.start(interrupt::USART3_4_5_6_LPUART1);
    edge_spawner
        .spawn(edge_task::run(oscillator))
        .expect("failed to spawn edge capture task");

    let controller = Controller::new(lcd, selector, MeterConfig::new());
    spawner
        .spawn(meter_task::run(controller, button, led))
        .expect("failed to spawn meter task");

    core::future::pending::<()>().await;
}
