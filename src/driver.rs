use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::RwLock;

use crate::command::{Command, CommandReceiver};
use crate::event::{BeatKind, EventLog};
use crate::tempo::{Tempo, TempoListener, TempoSnapshot};

/// Shared state between the clock thread and the UI
#[derive(Debug, Clone, Copy)]
pub struct TempoView {
    pub bpm: f64,
    pub beat_count: u32,
    pub ramp: f64,
    /// Coarsest boundary that fired on the latest tick, if any
    pub on_beat: Option<BeatKind>,
}

impl Default for TempoView {
    fn default() -> Self {
        Self {
            bpm: crate::tempo::DEFAULT_BPM,
            beat_count: 0,
            ramp: 0.0,
            on_beat: None,
        }
    }
}

/// Appends every fired boundary to the shared event log.
struct LogListener {
    events: Arc<RwLock<EventLog>>,
}

impl TempoListener for LogListener {
    fn on_beat(&mut self, tempo: &TempoSnapshot) {
        self.events
            .write()
            .record(BeatKind::Beat, tempo.bpm, tempo.beat_count);
    }

    fn on_half(&mut self, tempo: &TempoSnapshot) {
        self.events
            .write()
            .record(BeatKind::Half, tempo.bpm, tempo.beat_count);
    }

    fn on_measure(&mut self, tempo: &TempoSnapshot) {
        self.events
            .write()
            .record(BeatKind::Measure, tempo.bpm, tempo.beat_count);
    }
}

/// The frame driver: a thread owning the tempo engine, ticking it with
/// measured monotonic deltas and applying bus commands between ticks.
pub struct TempoDriver {
    pub view: Arc<RwLock<TempoView>>,
    pub events: Arc<RwLock<EventLog>>,
    handle: JoinHandle<Result<()>>,
}

impl TempoDriver {
    /// Spawn the clock thread.
    pub fn spawn(command_rx: CommandReceiver, start_bpm: f64, frame: Duration) -> Self {
        let view = Arc::new(RwLock::new(TempoView::default()));
        let events = Arc::new(RwLock::new(EventLog::new()));
        let thread_view = view.clone();
        let thread_events = events.clone();
        let handle =
            thread::spawn(move || run_loop(command_rx, start_bpm, frame, thread_view, thread_events));
        Self {
            view,
            events,
            handle,
        }
    }

    /// Wait for the clock thread to exit (after a `Quit` command).
    pub fn join(self) -> Result<()> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("clock thread panicked")),
        }
    }
}

fn run_loop(
    command_rx: CommandReceiver,
    start_bpm: f64,
    frame: Duration,
    view: Arc<RwLock<TempoView>>,
    events: Arc<RwLock<EventLog>>,
) -> Result<()> {
    let mut tempo = Tempo::new();
    tempo.set_bpm(start_bpm);
    tempo.add_listener(Box::new(LogListener { events }));

    let mut last = Instant::now();

    loop {
        // Apply control input between ticks. Taps carry the timestamp
        // captured at the input site, so queue latency does not stretch
        // the measured intervals.
        while let Some((cmd, _source)) = command_rx.try_recv() {
            match cmd {
                Command::Tap { smoothing: true, at_ms } => tempo.tap_at(at_ms),
                Command::Tap {
                    smoothing: false,
                    at_ms,
                } => tempo.tap_sync_at(at_ms),
                Command::Trigger => tempo.trigger(),
                Command::SetBpm(bpm) => tempo.set_bpm(bpm),
                Command::AdjustBpm(delta) => tempo.adjust_bpm(delta),
                Command::Quit => return Ok(()),
            }
        }

        let now = Instant::now();
        let delta_ms = now.duration_since(last).as_secs_f64() * 1_000.0;
        last = now;
        tempo.tick(delta_ms)?;

        let on_beat = if tempo.measure() {
            Some(BeatKind::Measure)
        } else if tempo.half() {
            Some(BeatKind::Half)
        } else if tempo.beat() {
            Some(BeatKind::Beat)
        } else {
            None
        };

        // Publish for readers; skip on contention rather than stall the tick.
        if let Some(mut v) = view.try_write() {
            *v = TempoView {
                bpm: tempo.bpm(),
                beat_count: tempo.beat_count(),
                ramp: tempo.ramp(),
                on_beat,
            };
        }

        thread::sleep(frame);
    }
}
