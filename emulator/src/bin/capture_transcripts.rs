use std::io;

use meter_core::config::MeterConfig;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Bench)?;
    record_profile(TranscriptProfile::Stall)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile, MeterConfig::new())?;
    match profile {
        TranscriptProfile::Bench => record_bench(&mut session),
        TranscriptProfile::Stall => record_stall(&mut session),
    }
}

fn record_bench(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("insert 144.3n")?;
    let _ = session.handle_command("run 3")?;
    let _ = session.handle_command("insert 1.5u")?;
    let _ = session.handle_command("run 2")?;
    let _ = session.handle_command("insert 250u")?;
    let _ = session.handle_command("run 3")?;
    let _ = session.handle_command("insert 47u")?;
    let _ = session.handle_command("run 2")?;
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("log 6")?;
    Ok(())
}

fn record_stall(session: &mut Session) -> io::Result<()> {
    let _ = session.handle_command("status")?;
    let _ = session.handle_command("short")?;
    let _ = session.handle_command("run 4")?;
    let _ = session.handle_command("remove")?;
    let _ = session.handle_command("run 3")?;
    let _ = session.handle_command("insert 470n")?;
    let _ = session.handle_command("run 3")?;
    let _ = session.handle_command("press")?;
    let _ = session.handle_command("press")?;
    let _ = session.handle_command("run 1")?;
    let _ = session.handle_command("press")?;
    let _ = session.handle_command("status")?;
    Ok(())
}
