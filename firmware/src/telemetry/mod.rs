//! Diagnostic log sink for the meter.
//!
//! Every helper has a defmt body for the MCU and a `println!` body for host
//! builds so bring-up code can be exercised without a probe attached. Labels
//! come from the core's `const fn` tables so defmt only ever sees
//! `&'static str`.

use meter_core::capture::StallReason;
use meter_core::controller::{PollOutcome, StartupStep};
use meter_core::display::FormattedReading;
use meter_core::telemetry::DiagnosticsRecord;

/// Logs the boot banner.
pub fn log_boot() {
    emit_banner("capacitance meter starting");
}

/// Logs the outcome of one startup attempt.
pub fn log_startup(step: StartupStep) {
    match step {
        StartupStep::Retry { attempt } => emit_startup_retry(attempt),
        StartupStep::Ready { attempts, detected } => {
            emit_startup_ready(attempts, detected);
            emit_banner("ready");
        }
    }
}

/// Logs one poll cycle; valid readings produce the per-poll diagnostics line.
pub fn log_poll(outcome: &PollOutcome) {
    match outcome {
        PollOutcome::Reading { record, shown } => {
            emit_reading(record, shown_label(shown));
        }
        PollOutcome::NoSignal => emit_banner("meter: no signal"),
        PollOutcome::Stalled(reason) => log_stall(*reason),
    }
}

/// Logs a stall reported by the edge task or found by the silence check.
pub fn log_stall(reason: StallReason) {
    emit_stall(reason.label());
}

/// Logs re-arming after a stall hold.
pub fn log_recovered() {
    emit_banner("meter: oscillator reset");
}

/// Logs a backlight toggle.
pub fn log_backlight(enabled: bool) {
    emit_banner(if enabled {
        "meter: backlight on"
    } else {
        "meter: backlight off"
    });
}

/// Logs display bus faults absorbed since the last report.
pub fn log_bus_errors(total: u32) {
    emit_bus_errors(total);
}

const fn shown_label(shown: &FormattedReading) -> &'static str {
    match shown {
        FormattedReading::InsertCapacitor => "insert",
        FormattedReading::OutOfRange => "out-of-range",
        FormattedReading::Value { .. } => "value",
    }
}

#[cfg(target_os = "none")]
fn emit_banner(message: &'static str) {
    defmt::info!("{}", message);
}

#[cfg(not(target_os = "none"))]
fn emit_banner(message: &'static str) {
    println!("{message}");
}

#[cfg(target_os = "none")]
fn emit_startup_retry(attempt: u8) {
    defmt::debug!("startup: attempt {} no plausible reading", attempt);
}

#[cfg(not(target_os = "none"))]
fn emit_startup_retry(attempt: u8) {
    println!("startup: attempt {attempt} no plausible reading");
}

#[cfg(target_os = "none")]
fn emit_startup_ready(attempts: u8, detected: bool) {
    defmt::info!("startup: ready after {} attempt(s) detected={}", attempts, detected);
}

#[cfg(not(target_os = "none"))]
fn emit_startup_ready(attempts: u8, detected: bool) {
    println!("startup: ready after {attempts} attempt(s) detected={detected}");
}

#[cfg(target_os = "none")]
fn emit_reading(record: &DiagnosticsRecord, shown: &'static str) {
    defmt::info!(
        "meter: period={}us cap={} {} range={} shown={}",
        record.period_us,
        record.reading.magnitude,
        record.reading.unit.symbol(),
        record.range.label(),
        shown
    );
}

#[cfg(not(target_os = "none"))]
fn emit_reading(record: &DiagnosticsRecord, shown: &'static str) {
    println!(
        "meter: period={}us cap={} {} range={} shown={}",
        record.period_us,
        record.reading.magnitude,
        record.reading.unit.symbol(),
        record.range.label(),
        shown
    );
}

#[cfg(target_os = "none")]
fn emit_stall(reason: &'static str) {
    defmt::warn!("meter: capture stalled ({})", reason);
}

#[cfg(not(target_os = "none"))]
fn emit_stall(reason: &'static str) {
    println!("meter: capture stalled ({reason})");
}

#[cfg(target_os = "none")]
fn emit_bus_errors(total: u32) {
    defmt::warn!("lcd: {} bus error(s) absorbed", total);
}

#[cfg(not(target_os = "none"))]
fn emit_bus_errors(total: u32) {
    println!("lcd: {total} bus error(s) absorbed");
}

#[cfg(test)]
mod tests {
    use meter_core::estimate::CapacitanceReading;
    use meter_core::range::Range;

    use super::*;

    #[test]
    fn shown_label_tracks_screen_variant() {
        assert_eq!(shown_label(&FormattedReading::InsertCapacitor), "insert");
        assert_eq!(shown_label(&FormattedReading::OutOfRange), "out-of-range");
    }

    #[test]
    fn host_sink_accepts_every_outcome() {
        let reading = CapacitanceReading::from_period(100, Range::Nanofarad);
        let record = DiagnosticsRecord::new(100, reading, Range::Nanofarad);
        log_boot();
        log_startup(StartupStep::Retry { attempt: 1 });
        log_startup(StartupStep::Ready { attempts: 2, detected: true });
        log_poll(&PollOutcome::NoSignal);
        log_poll(&PollOutcome::Stalled(StallReason::TooFast));
        log_poll(&PollOutcome::Reading {
            record,
            shown: FormattedReading::OutOfRange,
        });
        log_recovered();
        log_backlight(true);
        log_bus_errors(3);
    }
}
