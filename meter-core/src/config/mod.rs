//! Timing and ranging configuration shared by firmware and emulator.

use core::time::Duration;

use crate::range::RangeMode;

/// Cadence of the running poll loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);

/// Maximum number of startup capture attempts.
pub const DEFAULT_STARTUP_ATTEMPTS: u8 = 10;

/// Wait between startup capture attempts.
pub const DEFAULT_STARTUP_WAIT: Duration = Duration::from_millis(500);

/// How long "Insert capacitor" stays up before a stalled capture is re-armed.
pub const DEFAULT_STALL_HOLD: Duration = Duration::from_millis(1_000);

/// Lockout after a backlight button press.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Meter configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MeterConfig {
    poll_interval: Duration,
    startup_attempts: u8,
    startup_wait: Duration,
    stall_hold: Duration,
    debounce: Duration,
    range_mode: RangeMode,
}

impl MeterConfig {
    /// Creates the default configuration with auto-ranging enabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            startup_attempts: DEFAULT_STARTUP_ATTEMPTS,
            startup_wait: DEFAULT_STARTUP_WAIT,
            stall_hold: DEFAULT_STALL_HOLD,
            debounce: DEFAULT_DEBOUNCE,
            range_mode: RangeMode::Auto,
        }
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the startup attempt budget; zero is raised to one.
    #[must_use]
    pub const fn with_startup_attempts(mut self, attempts: u8) -> Self {
        self.startup_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    #[must_use]
    pub const fn with_startup_wait(mut self, wait: Duration) -> Self {
        self.startup_wait = wait;
        self
    }

    #[must_use]
    pub const fn with_stall_hold(mut self, hold: Duration) -> Self {
        self.stall_hold = hold;
        self
    }

    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Selects auto or manual ranging. Manual must be requested explicitly.
    #[must_use]
    pub const fn with_range_mode(mut self, mode: RangeMode) -> Self {
        self.range_mode = mode;
        self
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub const fn startup_attempts(&self) -> u8 {
        self.startup_attempts
    }

    #[must_use]
    pub const fn startup_wait(&self) -> Duration {
        self.startup_wait
    }

    #[must_use]
    pub const fn stall_hold(&self) -> Duration {
        self.stall_hold
    }

    #[must_use]
    pub const fn debounce(&self) -> Duration {
        self.debounce
    }

    #[must_use]
    pub const fn range_mode(&self) -> RangeMode {
        self.range_mode
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_meter_timing() {
        let config = MeterConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.startup_attempts(), 10);
        assert_eq!(config.startup_wait(), Duration::from_millis(500));
        assert_eq!(config.range_mode(), RangeMode::Auto);
    }

    #[test]
    fn zero_startup_attempts_still_runs_once() {
        let config = MeterConfig::new().with_startup_attempts(0);
        assert_eq!(config.startup_attempts(), 1);
    }
}
