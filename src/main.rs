mod app;
mod command;
mod driver;
mod event;
mod tempo;

use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use app::App;
use command::{Command, CommandBus, CommandSource};
use driver::TempoDriver;
use tempo::DEFAULT_BPM;

/// Tempoxide - Terminal tap-tempo engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Starting tempo in beats per minute (clamped to 20-240)
    #[arg(long, default_value_t = DEFAULT_BPM)]
    bpm: f64,

    /// Run headless for this many beats, print the event log, and exit
    #[arg(long)]
    beats: Option<u32>,

    /// Print events as JSON lines (headless mode)
    #[arg(long)]
    json: bool,

    /// Tick interval in milliseconds
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let frame = Duration::from_millis(args.frame_ms.max(1));

    let bus = CommandBus::new();
    let driver = TempoDriver::spawn(bus.receiver(), args.bpm, frame);

    if let Some(beats) = args.beats {
        return run_headless(&bus, driver, beats, args.json);
    }

    let mut app = App::new(bus.sender(), driver.view.clone(), frame);
    let result = app.run();

    // Stop the clock thread regardless of how the UI exited.
    bus.sender().send(Command::Quit, CommandSource::Keys);
    driver.join()?;
    result
}

/// Let the clock run for the requested number of beats, then dump every
/// logged event
fn run_headless(bus: &CommandBus, driver: TempoDriver, beats: u32, json: bool) -> Result<()> {
    let events = driver.events.clone();
    let view = driver.view.clone();

    while view.read().beat_count < beats {
        thread::sleep(Duration::from_millis(10));
    }
    bus.sender().send(Command::Quit, CommandSource::Headless);
    driver.join()?;

    for event in events.read().events_since(0) {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!(
                "{:>4}  {:<7}  {:6.1} bpm  beat {}",
                event.id,
                format!("{:?}", event.kind).to_lowercase(),
                event.bpm,
                event.beat_count
            );
        }
    }
    Ok(())
}
