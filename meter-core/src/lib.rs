#![cfg_attr(not(test), no_std)]

// Measurement core for the RC-oscillator capacitance meter.
//
// Everything here stays portable across the MCU firmware and the host emulator:
// no allocation, no standard library, and time is always injected by the caller
// as a wrapping microsecond counter.

pub mod button;
pub mod capture;
pub mod config;
pub mod controller;
pub mod display;
pub mod estimate;
pub mod lcd;
pub mod range;
pub mod telemetry;
