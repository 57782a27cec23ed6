use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use parking_lot::RwLock;

use crate::command::{Command, CommandSender, CommandSource};
use crate::driver::TempoView;
use crate::event::BeatKind;
use crate::tempo::DEFAULT_BPM;

const PHASE_METER_CELLS: usize = 16;

/// Interactive front end: raw-mode key input feeding the command bus,
/// with a single status line showing the live tempo state.
pub struct App {
    command_sender: CommandSender,
    /// Shared tempo state (read from the clock thread)
    view: Arc<RwLock<TempoView>>,
    /// Anchor for tap timestamps; taps only ever compare against each
    /// other, so any fixed monotonic origin works
    origin: Instant,
    frame: Duration,
    should_quit: bool,
}

impl App {
    pub fn new(command_sender: CommandSender, view: Arc<RwLock<TempoView>>, frame: Duration) -> Self {
        Self {
            command_sender,
            view,
            origin: Instant::now(),
            frame,
            should_quit: false,
        }
    }

    /// Run the main application loop
    pub fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let result = self.main_loop();
        disable_raw_mode()?;
        println!();
        result
    }

    fn main_loop(&mut self) -> Result<()> {
        println!("space: tap  s: sync tap  t: trigger  +/-: nudge bpm  r: reset  q: quit");

        loop {
            self.render_status()?;

            if event::poll(self.frame)? {
                if let Event::Key(key) = event::read()? {
                    // Only handle key press events (not release)
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key);
                    }
                }
            }

            if self.should_quit {
                break;
            }
        }

        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char(' ') => self.dispatch(Command::Tap {
                smoothing: true,
                at_ms: self.now_ms(),
            }),
            KeyCode::Char('s') => self.dispatch(Command::Tap {
                smoothing: false,
                at_ms: self.now_ms(),
            }),
            KeyCode::Char('t') => self.dispatch(Command::Trigger),
            KeyCode::Char('+') | KeyCode::Char('=') => self.dispatch(Command::AdjustBpm(1.0)),
            KeyCode::Char('-') => self.dispatch(Command::AdjustBpm(-1.0)),
            KeyCode::Up => self.dispatch(Command::AdjustBpm(10.0)),
            KeyCode::Down => self.dispatch(Command::AdjustBpm(-10.0)),
            KeyCode::Char('r') => self.dispatch(Command::SetBpm(DEFAULT_BPM)),
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            _ => {}
        }
    }

    /// Dispatch a command through the command bus
    fn dispatch(&mut self, cmd: Command) {
        self.command_sender.send(cmd, CommandSource::Keys);
    }

    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1_000.0
    }

    /// Rewrite the status line in place
    fn render_status(&self) -> Result<()> {
        let view = *self.view.read();
        let filled = ((view.ramp * PHASE_METER_CELLS as f64) as usize).min(PHASE_METER_CELLS - 1);
        let mut meter = String::with_capacity(PHASE_METER_CELLS);
        for i in 0..PHASE_METER_CELLS {
            meter.push(if i <= filled { '#' } else { '-' });
        }

        let pulse = match view.on_beat {
            Some(BeatKind::Measure) => '!',
            Some(BeatKind::Half) => '|',
            Some(BeatKind::Beat) => '.',
            None => ' ',
        };

        let mut stdout = io::stdout();
        write!(
            stdout,
            "\r{:6.1} bpm | beat {:>5} | [{}] {}",
            view.bpm, view.beat_count, meter, pulse
        )?;
        stdout.flush()?;
        Ok(())
    }
}
