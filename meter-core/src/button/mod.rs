//! Backlight button debouncing.
//!
//! A detected press is accepted immediately and then starts a fixed lockout;
//! anything the contacts do during the lockout is ignored. Holding the button
//! down therefore repeats once per lockout window.

use core::time::Duration;

use crate::capture::Micros;

/// Active-low momentary button with a post-press lockout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ButtonDebouncer {
    lockout_us: Micros,
    last_accepted: Option<Micros>,
}

impl ButtonDebouncer {
    /// Creates a debouncer with the given lockout window.
    #[must_use]
    pub fn new(lockout: Duration) -> Self {
        let lockout_us = Micros::try_from(lockout.as_micros()).unwrap_or(Micros::MAX);
        Self {
            lockout_us,
            last_accepted: None,
        }
    }

    /// Registers an edge-detected press; returns `true` when accepted.
    pub fn press(&mut self, now_us: Micros) -> bool {
        if let Some(last) = self.last_accepted
            && now_us.wrapping_sub(last) < self.lockout_us
        {
            return false;
        }

        self.last_accepted = Some(now_us);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_press_is_always_accepted() {
        let mut button = ButtonDebouncer::new(Duration::from_millis(500));
        assert!(button.press(0));
    }

    #[test]
    fn bounces_inside_lockout_are_ignored() {
        let mut button = ButtonDebouncer::new(Duration::from_millis(500));
        assert!(button.press(1_000));
        assert!(!button.press(2_000));
        assert!(!button.press(400_000));
        assert!(button.press(501_000));
    }

    #[test]
    fn lockout_survives_counter_wrap() {
        let mut button = ButtonDebouncer::new(Duration::from_millis(500));
        assert!(button.press(u32::MAX - 100));
        assert!(!button.press(1_000));
        assert!(button.press(500_000));
    }
}
