//! Board wiring for the STM32G0B1 capacitance meter.
//!
//! | Pin  | Function                                  |
//! |------|-------------------------------------------|
//! | PA0  | oscillator input, rising edge (EXTI0)     |
//! | PA1  | range select, low = nF network            |
//! | PA4  | backlight button, active low (EXTI4)      |
//! | PA5  | user LED, lit while startup runs          |
//! | PA6  | MCP23017 reset, active low                |
//! | PB8  | I2C1 SCL                                  |
//! | PB9  | I2C1 SDA                                  |

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use meter_core::capture::EdgeSource;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Arm/disarm gate between the poll loop and the edge task.
///
/// The edge task parks on [`EdgeGate::armed`] while capture is disarmed. Each
/// [`EdgeSource::clear_pending`] bumps an epoch so an edge the task was already
/// waiting for when recovery ran is dropped instead of being timed against
/// the fresh seed.
pub struct EdgeGate {
    armed: AtomicBool,
    epoch: AtomicU32,
    wake: Signal<CriticalSectionRawMutex, ()>,
}

impl EdgeGate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            epoch: AtomicU32::new(0),
            wake: Signal::new(),
        }
    }

    /// Waits until capture is armed and returns the current epoch.
    pub async fn armed(&self) -> u32 {
        loop {
            if self.armed.load(Ordering::Acquire) {
                return self.epoch.load(Ordering::Acquire);
            }
            self.wake.wait().await;
        }
    }

    /// Returns `true` when an edge observed under `epoch` may be timed.
    pub fn accepts(&self, epoch: u32) -> bool {
        self.armed.load(Ordering::Acquire) && self.epoch.load(Ordering::Acquire) == epoch
    }
}

impl Default for EdgeGate {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeSource for &EdgeGate {
    fn arm(&mut self) {
        self.armed.store(true, Ordering::Release);
        self.wake.signal(());
    }

    fn disarm(&mut self) {
        self.armed.store(false, Ordering::Release);
    }

    fn clear_pending(&mut self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

#[cfg(target_os = "none")]
pub use self::pins::{RangeSelectPin, StatusLed};

#[cfg(target_os = "none")]
mod pins {
    use embassy_stm32::gpio::Output;
    use meter_core::range::{RangeNetwork, RangeSelect};

    /// Push-pull output routing the probe through the selected network.
    pub struct RangeSelectPin<'d> {
        pin: Output<'d>,
    }

    impl<'d> RangeSelectPin<'d> {
        pub fn new(pin: Output<'d>) -> Self {
            Self { pin }
        }
    }

    impl RangeSelect for RangeSelectPin<'_> {
        fn select(&mut self, network: RangeNetwork) {
            if network.is_high() {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
        }
    }

    /// User LED, lit while the meter is still starting up.
    pub struct StatusLed<'d> {
        pin: Output<'d>,
    }

    impl<'d> StatusLed<'d> {
        pub fn new(pin: Output<'d>) -> Self {
            Self { pin }
        }

        pub fn set_busy(&mut self, busy: bool) {
            if busy {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
        }
    }
}
