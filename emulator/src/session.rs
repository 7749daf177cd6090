use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use meter_core::capture::{
    CaptureState, EdgeOutcome, EdgeSource, EdgeTimer, MAX_PERIOD_US, Micros,
};
use meter_core::config::MeterConfig;
use meter_core::controller::{Controller, PollOutcome, StartupStep};
use meter_core::display::{CharacterDisplay, DISPLAY_COLUMNS};
use meter_core::estimate::OSC_CONSTANT;
use meter_core::range::{RangeMode, RangeNetwork, RangeSelect};

/// Period the oscillator settles at with nothing across the probe.
pub const OPEN_PROBE_PERIOD_US: u64 = 5;

/// Events shown by `log` without an explicit count.
const DEFAULT_LOG_COUNT: usize = 8;

/// Periods this many times past the capture bound are modelled as a stopped
/// oscillator.
const STOPPED_PERIOD_FACTOR: f64 = 10.0;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "insert",
        "insert <value>[n|u]       - attach a capacitor (e.g. `insert 470n`, `insert 4.7u`)",
    ),
    (
        "remove",
        "remove                    - leave the probe open (oscillator runs too fast)",
    ),
    (
        "short",
        "short                     - stop the oscillator (no edges at all)",
    ),
    (
        "run",
        "run [seconds]             - advance the meter loop (default 1s)",
    ),
    (
        "press",
        "press                     - press the backlight button",
    ),
    (
        "mode",
        "mode <auto|manual>        - switch auto-ranging on or off",
    ),
    (
        "status",
        "status                    - show range, capture state and screen",
    ),
    (
        "log",
        "log [count]               - show the most recent meter events (default 8)",
    ),
    (
        "help",
        "help [topic]              - show help for a command",
    ),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Bench,
    Stall,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Bench => "evidence/emulator-bench.log",
            TranscriptProfile::Stall => "evidence/emulator-stall.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Bench => "Capacitance meter emulator bench transcript",
            TranscriptProfile::Stall => "Capacitance meter emulator stall/recovery transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("bench") {
            Ok(Self::Bench)
        } else if tag.eq_ignore_ascii_case("stall") {
            Ok(Self::Stall)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

/// What is attached across the probe terminals.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Probe {
    Open,
    Short,
    Capacitor { nanofarads: f32 },
}

impl Probe {
    /// Oscillator period for this probe, or `None` when the oscillator stops.
    ///
    /// A capacitor so large that its period is far beyond [`MAX_PERIOD_US`]
    /// behaves like a short: no edge ever arrives.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn period_us(self) -> Option<u64> {
        match self {
            Probe::Open => Some(OPEN_PROBE_PERIOD_US),
            Probe::Short => None,
            Probe::Capacitor { nanofarads } => {
                let period = (f64::from(nanofarads) / f64::from(OSC_CONSTANT)).round();
                if !period.is_finite()
                    || period > STOPPED_PERIOD_FACTOR * f64::from(MAX_PERIOD_US)
                {
                    return None;
                }
                Some((period as u64).max(1))
            }
        }
    }
}

/// Parses `470n`, `4.7u`, `4.7uF` or a bare nanofarad value.
pub fn parse_capacitance(input: &str) -> Result<f32, String> {
    let lowered = input.trim().to_ascii_lowercase();
    let without_farad = lowered.strip_suffix('f').unwrap_or(&lowered);
    let (digits, multiplier) = if let Some(value) = without_farad.strip_suffix('u') {
        (value, 1000.0)
    } else if let Some(value) = without_farad.strip_suffix('n') {
        (value, 1.0)
    } else {
        (without_farad, 1.0)
    };

    let value: f32 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid capacitance `{input}`"))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("capacitance must be positive, got `{input}`"));
    }
    let nanofarads = value * multiplier;
    if !nanofarads.is_finite() {
        return Err(format!("capacitance `{input}` is out of range"));
    }
    Ok(nanofarads)
}

/// Edge gate mirroring the firmware's EXTI arm/disarm control.
#[derive(Debug, Default)]
pub struct HostEdgeGate {
    armed: bool,
    pending_cleared: u32,
}

impl EdgeSource for HostEdgeGate {
    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    fn clear_pending(&mut self) {
        self.pending_cleared += 1;
    }

    fn is_armed(&self) -> bool {
        self.armed
    }
}

/// Range-select output that remembers which network is routed.
#[derive(Debug)]
pub struct HostRangeSelect {
    network: RangeNetwork,
}

impl HostRangeSelect {
    pub fn network(&self) -> RangeNetwork {
        self.network
    }
}

impl RangeSelect for HostRangeSelect {
    fn select(&mut self, network: RangeNetwork) {
        self.network = network;
    }
}

/// 16x2 character buffer standing in for the LCD.
#[derive(Debug)]
pub struct ConsoleDisplay {
    lines: [[u8; DISPLAY_COLUMNS]; 2],
    line: usize,
    column: usize,
    backlight: bool,
}

impl ConsoleDisplay {
    fn new() -> Self {
        Self {
            lines: [[b' '; DISPLAY_COLUMNS]; 2],
            line: 0,
            column: 0,
            backlight: false,
        }
    }

    /// Returns one display line with trailing blanks trimmed.
    pub fn line(&self, index: usize) -> String {
        String::from_utf8_lossy(&self.lines[index.min(1)])
            .trim_end()
            .to_string()
    }

    /// Returns both lines padded to the display width.
    pub fn rows(&self) -> [String; 2] {
        [0, 1].map(|index| String::from_utf8_lossy(&self.lines[index]).into_owned())
    }
}

impl CharacterDisplay for ConsoleDisplay {
    fn clear(&mut self) {
        self.lines = [[b' '; DISPLAY_COLUMNS]; 2];
        self.line = 0;
        self.column = 0;
    }

    fn write(&mut self, text: &str) {
        for byte in text.bytes() {
            if self.column >= DISPLAY_COLUMNS {
                break;
            }
            self.lines[self.line][self.column] = byte;
            self.column += 1;
        }
    }

    fn write_at(&mut self, text: &str, line: u8, column: u8) {
        self.line = usize::from(line.min(1));
        self.column = usize::from(column);
        self.write(text);
    }

    fn set_backlight(&mut self, enabled: bool) {
        self.backlight = enabled;
    }

    fn backlight(&self) -> bool {
        self.backlight
    }
}

pub struct Session {
    controller: Controller<ConsoleDisplay, HostRangeSelect>,
    timer: EdgeTimer,
    gate: HostEdgeGate,
    probe: Probe,
    next_edge_us: Option<u64>,
    clock_us: u64,
    next_poll_us: u64,
    transcript: TranscriptLogger,
}

impl Session {
    /// Starts a session that records its transcript under `evidence/`.
    pub fn new(profile: TranscriptProfile, config: MeterConfig) -> io::Result<Self> {
        let transcript = TranscriptLogger::create(profile)?;
        Self::with_transcript(config, transcript)
    }

    /// Starts a session whose transcript is discarded.
    pub fn detached(config: MeterConfig) -> io::Result<Self> {
        Self::with_transcript(config, TranscriptLogger::discard())
    }

    fn with_transcript(config: MeterConfig, transcript: TranscriptLogger) -> io::Result<Self> {
        let selector = HostRangeSelect {
            network: RangeNetwork::Low,
        };
        let mut session = Self {
            controller: Controller::new(ConsoleDisplay::new(), selector, config),
            timer: EdgeTimer::new(),
            gate: HostEdgeGate::default(),
            probe: Probe::Open,
            next_edge_us: None,
            clock_us: 0,
            next_poll_us: 0,
            transcript,
        };
        session.attach(Probe::Open);
        let lines = session.boot();
        session.record_output(&lines)?;
        Ok(session)
    }

    pub fn screen(&self) -> &ConsoleDisplay {
        self.controller.display()
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.clock_us)
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.elapsed();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let mut words = trimmed.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();

        let lines = match (command.as_str(), argument) {
            ("help", topic) => help_lines(topic),
            ("insert", Some(value)) => match parse_capacitance(value) {
                Ok(nanofarads) => {
                    self.attach(Probe::Capacitor { nanofarads });
                    vec![format!("OK probe capacitor {nanofarads} nF")]
                }
                Err(err) => vec![format!("ERR {err}")],
            },
            ("insert", None) => vec!["ERR insert needs a value".to_string()],
            ("remove", _) => {
                self.attach(Probe::Open);
                vec!["OK probe open".to_string()]
            }
            ("short", _) => {
                self.attach(Probe::Short);
                vec!["OK probe shorted".to_string()]
            }
            ("run", seconds) => match parse_seconds(seconds) {
                Ok(duration) => self.run_for(duration),
                Err(err) => vec![format!("ERR {err}")],
            },
            ("press", _) => self.press(),
            ("mode", Some(mode)) if mode.eq_ignore_ascii_case("auto") => {
                self.controller.set_range_mode(RangeMode::Auto);
                vec!["OK mode auto".to_string()]
            }
            ("mode", Some(mode)) if mode.eq_ignore_ascii_case("manual") => {
                self.controller.set_range_mode(RangeMode::Manual);
                vec!["OK mode manual (pinned to nF)".to_string()]
            }
            ("mode", _) => vec!["ERR mode expects `auto` or `manual`".to_string()],
            ("status", _) => self.status(),
            ("log", count) => match parse_count(count) {
                Ok(count) => self.history(count),
                Err(err) => vec![format!("ERR {err}")],
            },
            (other, _) => vec![format!("ERR unknown command `{other}` (try `help`)")],
        };

        self.record_output(&lines)?;
        Ok(lines)
    }

    /// Runs the startup splash and attempts the way the firmware does at reset.
    fn boot(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let config = *self.controller.config();

        self.controller.begin();
        self.timer.recover(self.now(), &mut self.gate);
        loop {
            self.deliver_edges(self.clock_us + micros(config.startup_wait()), false);
            self.clock_us += micros(config.startup_wait());
            let now = self.now();
            match self
                .controller
                .startup_attempt(&self.timer, &mut self.gate, now)
            {
                StartupStep::Retry { attempt } => {
                    lines.push(format!("startup attempt {attempt}: no signal"));
                }
                StartupStep::Ready { attempts, detected } => {
                    lines.push(format!(
                        "startup complete after {attempts} attempt(s) detected={detected}"
                    ));
                    break;
                }
            }
        }

        self.next_poll_us = self.clock_us + micros(config.poll_interval());
        lines
    }

    /// Advances simulated time, polling on the configured cadence and
    /// handling stalls as soon as the capture reports one.
    pub fn run_for(&mut self, duration: Duration) -> Vec<String> {
        let config = *self.controller.config();
        let end = self.clock_us + micros(duration);
        let mut lines = Vec::new();

        while self.clock_us < end {
            let target = self.next_poll_us.min(end);
            if let Some(stalled_at) = self.deliver_edges(target, true) {
                self.clock_us = stalled_at;
            } else {
                self.clock_us = target;
                if target < self.next_poll_us {
                    break;
                }
            }

            let now = self.now();
            match self.controller.poll(&self.timer, now) {
                PollOutcome::Reading { record, shown } => {
                    lines.push(format!(
                        "+{}ms {} | {record} range={}",
                        self.clock_us / 1000,
                        shown.as_str(),
                        record.range
                    ));
                    self.next_poll_us = self.clock_us + micros(config.poll_interval());
                }
                PollOutcome::NoSignal => {
                    lines.push(format!("+{}ms no signal", self.clock_us / 1000));
                    self.next_poll_us = self.clock_us + micros(config.poll_interval());
                }
                PollOutcome::Stalled(reason) => {
                    lines.push(format!(
                        "+{}ms capture stalled ({reason}), holding {}ms",
                        self.clock_us / 1000,
                        config.stall_hold().as_millis()
                    ));
                    let resume = self.clock_us + micros(config.stall_hold());
                    self.deliver_edges(resume, false);
                    self.clock_us = resume;
                    let now = self.now();
                    self.controller.recover(&self.timer, &mut self.gate, now);
                    lines.push(format!("+{}ms capture re-armed", self.clock_us / 1000));
                    self.next_poll_us = self.clock_us + micros(config.poll_interval());
                }
            }
        }

        lines
    }

    fn press(&mut self) -> Vec<String> {
        let now = self.now();
        match self.controller.button_pressed(now) {
            Some(true) => vec!["OK backlight on".to_string()],
            Some(false) => vec!["OK backlight off".to_string()],
            None => vec!["ignored (debounce lockout)".to_string()],
        }
    }

    fn status(&self) -> Vec<String> {
        let snapshot = self.timer.snapshot();
        let capture = match snapshot.state {
            CaptureState::Armed => "armed".to_string(),
            CaptureState::Stalled(reason) => format!("stalled ({reason})"),
        };
        let network = match self.controller.selector().network() {
            RangeNetwork::Low => "low",
            RangeNetwork::High => "high",
        };

        vec![
            format!(
                "range={} display-unit={} network={network} capture={capture}",
                self.controller.range(),
                self.controller.display_range()
            ),
            format!(
                "probe={:?} period={} backlight={} recoveries={}",
                self.probe,
                snapshot
                    .period_us()
                    .map_or_else(|| "-".to_string(), |period| format!("{period}us")),
                if self.screen().backlight() { "on" } else { "off" },
                self.gate.pending_cleared
            ),
            format!(
                "last-event={}",
                self.controller
                    .telemetry()
                    .latest()
                    .map_or_else(|| "-".to_string(), |record| record.event.to_string())
            ),
            format!("screen[0]=\"{}\"", self.screen().line(0)),
            format!("screen[1]=\"{}\"", self.screen().line(1)),
        ]
    }

    /// Renders the newest `count` entries of the controller's event ring.
    fn history(&self, count: usize) -> Vec<String> {
        let telemetry = self.controller.telemetry();
        if telemetry.is_empty() {
            return vec!["no events recorded".to_string()];
        }

        telemetry
            .oldest_first()
            .skip(telemetry.len().saturating_sub(count))
            .map(ToString::to_string)
            .collect()
    }

    fn attach(&mut self, probe: Probe) {
        self.probe = probe;
        self.next_edge_us = probe
            .period_us()
            .and_then(|period| self.clock_us.checked_add(period));
    }

    /// Delivers oscillator edges up to `target_us` and returns the time of
    /// the edge that stalled capture, if any.
    ///
    /// With `stop_at_stall` the walk ends on the stalling edge so the caller
    /// can react at that instant; otherwise the remaining edges are dropped by
    /// the disarmed gate.
    fn deliver_edges(&mut self, target_us: u64, stop_at_stall: bool) -> Option<u64> {
        let period = self.probe.period_us()?;
        let mut stalled_at = None;

        while let Some(edge) = self.next_edge_us
            && edge <= target_us
        {
            if !self.gate.is_armed() {
                let skipped = (target_us - edge) / period + 1;
                self.next_edge_us = Some(edge + skipped * period);
                break;
            }

            self.next_edge_us = Some(edge + period);
            if let EdgeOutcome::Stalled(_) = self.timer.on_edge(wrap_micros(edge)) {
                self.gate.disarm();
                stalled_at = Some(edge);
                if stop_at_stall {
                    break;
                }
            }
        }

        stalled_at
    }

    fn now(&self) -> Micros {
        wrap_micros(self.clock_us)
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let elapsed = self.elapsed();
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

/// Truncates simulated time to the meter's wrapping microsecond counter.
#[allow(clippy::cast_possible_truncation)]
fn wrap_micros(time_us: u64) -> Micros {
    time_us as Micros
}

#[allow(clippy::cast_possible_truncation)]
fn micros(duration: Duration) -> u64 {
    duration.as_micros() as u64
}

fn parse_seconds(argument: Option<&str>) -> Result<Duration, String> {
    let Some(text) = argument else {
        return Ok(Duration::from_secs(1));
    };
    let seconds: f64 = text
        .trim_end_matches('s')
        .parse()
        .map_err(|_| format!("invalid duration `{text}`"))?;
    Duration::try_from_secs_f64(seconds).map_err(|_| format!("invalid duration `{text}`"))
}

fn parse_count(argument: Option<&str>) -> Result<usize, String> {
    let Some(text) = argument else {
        return Ok(DEFAULT_LOG_COUNT);
    };
    text.parse()
        .map_err(|_| format!("invalid event count `{text}`"))
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

struct TranscriptLogger {
    writer: Box<dyn Write>,
}

impl TranscriptLogger {
    fn create(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: Box::new(BufWriter::new(file)),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn discard() -> Self {
        Self {
            writer: Box::new(io::sink()),
        }
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are simulated milliseconds since reset"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
