mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::process;
use std::time::Duration;

use crossterm::queue;
use crossterm::style::{Print, PrintStyledContent, Stylize};
use meter_core::config::MeterConfig;
use meter_core::display::CharacterDisplay;
use meter_core::range::RangeMode;

use session::{ConsoleDisplay, Session, TranscriptProfile};

struct Options {
    profile: TranscriptProfile,
    config: MeterConfig,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!(
            "Usage: meter-emulator [--profile <bench|stall>] [--manual-range] [--poll-ms N] \
             [--startup-wait-ms N] [--stall-hold-ms N] [--debounce-ms N]"
        );
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.profile, options.config)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Capacitance meter emulator ready. Type `help` for commands or `exit` to quit."
    )?;
    render_screen(&mut writer, session.screen())?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
        render_screen(&mut writer, session.screen())?;
    }

    Ok(())
}

/// Draws the 16x2 buffer, lit or dark depending on the backlight.
fn render_screen(writer: &mut impl Write, screen: &ConsoleDisplay) -> io::Result<()> {
    let border = format!("+{}+\n", "-".repeat(16));
    queue!(writer, Print(&border))?;
    for row in screen.rows() {
        let cells = if screen.backlight() {
            row.black().on_green()
        } else {
            row.dark_grey().on_black()
        };
        queue!(writer, Print("|"), PrintStyledContent(cells), Print("|\n"))?;
    }
    queue!(writer, Print(&border))?;
    writer.flush()
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options<I>(args: I) -> Result<Options, String>
where
    I: IntoIterator<Item = String>,
{
    let mut profile = TranscriptProfile::Bench;
    let mut config = MeterConfig::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => {
                (flag.to_string(), Some(value.to_string()))
            }
            _ => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--profile" => profile = TranscriptProfile::from_tag(&value()?)?,
            "--manual-range" => config = config.with_range_mode(RangeMode::Manual),
            "--poll-ms" => config = config.with_poll_interval(parse_millis(&flag, &value()?)?),
            "--startup-wait-ms" => {
                config = config.with_startup_wait(parse_millis(&flag, &value()?)?);
            }
            "--stall-hold-ms" => config = config.with_stall_hold(parse_millis(&flag, &value()?)?),
            "--debounce-ms" => config = config.with_debounce(parse_millis(&flag, &value()?)?),
            tag => profile = TranscriptProfile::from_tag(tag)?,
        }
    }

    Ok(Options { profile, config })
}

fn parse_millis(flag: &str, text: &str) -> Result<Duration, String> {
    let millis: u64 = text
        .parse()
        .map_err(|_| format!("{flag} expects milliseconds, got `{text}`"))?;
    if millis == 0 {
        return Err(format!("{flag} must be greater than zero"));
    }
    Ok(Duration::from_millis(millis))
}
