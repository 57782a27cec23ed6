use std::mem;

use super::clock::Clock;
use super::tap::TapState;
use super::time::{MonotonicClock, TimeSource};
use super::{TempoError, DEFAULT_BPM, MAX_BPM, MINUTE_MS, MIN_BPM};

/// Read-only view of the engine handed to listeners and published across
/// threads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoSnapshot {
    pub bpm: f64,
    pub beat_count: u32,
    pub basis: f64,
}

/// Beat observer. Callbacks run right after the tick that crossed the
/// boundary; implement only the granularities you care about. On a
/// measure boundary all three fire, on a half boundary the first two.
pub trait TempoListener: Send {
    fn on_beat(&mut self, _tempo: &TempoSnapshot) {}
    fn on_half(&mut self, _tempo: &TempoSnapshot) {}
    fn on_measure(&mut self, _tempo: &TempoSnapshot) {}
}

/// Handle for unsubscribing a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// The tempo engine: tracks BPM, derives a continuously advancing beat
/// phase, detects beat/half/measure boundaries, and re-syncs from tap
/// input.
///
/// All state is mutated through `&mut self` from one scheduling context;
/// input arriving from other threads must be serialized in front of the
/// engine (the binary routes it through the command bus).
pub struct Tempo {
    bpm: f64,
    clock: Clock,
    taps: TapState,
    beat_count: u32,
    // One-tick suppression set by trigger(), consumed at the end of every
    // tick, so a forced firing is never double-counted.
    triggered: bool,
    listeners: Vec<(ListenerId, Box<dyn TempoListener>)>,
    next_listener_id: u64,
    time: Box<dyn TimeSource>,
}

impl Tempo {
    pub fn new() -> Self {
        Self::with_time_source(Box::new(MonotonicClock::new()))
    }

    /// Build an engine reading tap timestamps from the given source.
    pub fn with_time_source(time: Box<dyn TimeSource>) -> Self {
        Self {
            bpm: DEFAULT_BPM,
            clock: Clock::new(MINUTE_MS / DEFAULT_BPM),
            taps: TapState::new(),
            beat_count: 0,
            triggered: false,
            listeners: Vec::new(),
            next_listener_id: 0,
            time,
        }
    }

    /// Advance the engine by one frame. Counts beat boundaries and
    /// notifies listeners of any beat/half/measure that fired.
    pub fn tick(&mut self, delta_ms: f64) -> Result<(), TempoError> {
        let is_beat = self.clock.advance(delta_ms)?;
        if is_beat && !self.triggered {
            self.beat_count += 1;
        }
        self.triggered = false;
        self.dispatch();
        Ok(())
    }

    /// True on the tick where a quarter-note boundary was crossed.
    /// Latched until the next tick, so repeated queries agree.
    pub fn beat(&self) -> bool {
        self.clock.fired()
    }

    /// True on every second beat.
    pub fn half(&self) -> bool {
        self.beat() && self.beat_count % 2 == 0
    }

    /// True on every fourth beat, the start of a 4/4 measure.
    pub fn measure(&self) -> bool {
        self.beat() && self.beat_count % 4 == 0
    }

    /// Phase of the current beat: 0 on the beat, ramping up towards 1
    /// before the next one.
    pub fn ramp(&self) -> f64 {
        self.clock.basis()
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn beat_count(&self) -> u32 {
        self.beat_count
    }

    pub fn period_ms(&self) -> f64 {
        self.clock.period()
    }

    /// Set the tempo. Out-of-range values are clamped, never rejected.
    /// The oscillator keeps its accumulated phase, so a change mid-beat
    /// reshapes the remaining phase rather than restarting it.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        self.clock.set_period(MINUTE_MS / self.bpm);
    }

    /// Adjust the tempo by the given amount.
    pub fn adjust_bpm(&mut self, delta: f64) {
        self.set_bpm(self.bpm + delta);
    }

    /// Re-trigger the metronome so it beats immediately: phase rewinds to
    /// zero, the counter returns to the downbeat, and the next tick is
    /// suppressed from counting the forced firing a second time.
    pub fn trigger(&mut self) {
        self.beat_count = 0;
        self.clock.fire();
        self.triggered = true;
    }

    /// Smoothing tap at the current time; see [`Tempo::tap_at`].
    pub fn tap(&mut self) {
        let now_ms = self.time.now_ms();
        self.tap_at(now_ms);
    }

    /// Tap in the requested mode at the current time.
    pub fn tap_with(&mut self, smoothing: bool) {
        let now_ms = self.time.now_ms();
        if smoothing {
            self.tap_at(now_ms);
        } else {
            self.tap_sync_at(now_ms);
        }
    }

    /// Smoothing tap at an explicit monotonic timestamp. Once four taps
    /// land within the stale window the averaged tempo is applied; every
    /// tap re-triggers, so the phase snaps to the tap even before the
    /// estimate settles.
    pub fn tap_at(&mut self, now_ms: f64) {
        if let Some(bpm) = self.taps.tap(now_ms) {
            self.set_bpm(bpm);
        }
        self.trigger();
    }

    /// Single-pair tap for following an external clock: no averaging and
    /// no re-trigger. The first call ever has no reference interval and
    /// leaves the tempo untouched.
    pub fn tap_sync_at(&mut self, now_ms: f64) {
        if let Some(bpm) = self.taps.tap_sync(now_ms) {
            self.set_bpm(bpm);
        }
    }

    /// Subscribe a listener; notification order is subscription order.
    pub fn add_listener(&mut self, listener: Box<dyn TempoListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Unsubscribe a previously added listener. Unknown handles are a
    /// no-op.
    pub fn remove_listener(&mut self, id: ListenerId) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    pub fn snapshot(&self) -> TempoSnapshot {
        TempoSnapshot {
            bpm: self.bpm,
            beat_count: self.beat_count,
            basis: self.ramp(),
        }
    }

    fn dispatch(&mut self) {
        if !self.beat() || self.listeners.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        let half = self.half();
        let measure = self.measure();
        // Iterate a detached list: listeners only ever see an immutable
        // snapshot and can never reach the registry mid-dispatch.
        let mut listeners = mem::take(&mut self.listeners);
        for (_, listener) in listeners.iter_mut() {
            listener.on_beat(&snapshot);
            if half {
                listener.on_half(&snapshot);
            }
            if measure {
                listener.on_measure(&snapshot);
            }
        }
        self.listeners = listeners;
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    // 120 BPM default, so one beat every 500 ms.
    const BEAT_MS: f64 = 500.0;

    struct FakeTime(Arc<Mutex<f64>>);

    impl TimeSource for FakeTime {
        fn now_ms(&self) -> f64 {
            *self.0.lock()
        }
    }

    fn tempo_with_fake_time() -> (Tempo, Arc<Mutex<f64>>) {
        let now = Arc::new(Mutex::new(0.0));
        let tempo = Tempo::with_time_source(Box::new(FakeTime(now.clone())));
        (tempo, now)
    }

    #[derive(Default)]
    struct Counts {
        beats: u32,
        halves: u32,
        measures: u32,
    }

    struct Recorder(Arc<Mutex<Counts>>);

    impl TempoListener for Recorder {
        fn on_beat(&mut self, _tempo: &TempoSnapshot) {
            self.0.lock().beats += 1;
        }
        fn on_half(&mut self, _tempo: &TempoSnapshot) {
            self.0.lock().halves += 1;
        }
        fn on_measure(&mut self, _tempo: &TempoSnapshot) {
            self.0.lock().measures += 1;
        }
    }

    #[test]
    fn set_bpm_clamps_to_bounds() {
        let mut tempo = Tempo::new();
        tempo.set_bpm(5.0);
        assert_eq!(tempo.bpm(), MIN_BPM);
        tempo.set_bpm(10_000.0);
        assert_eq!(tempo.bpm(), MAX_BPM);
        tempo.set_bpm(93.5);
        assert_eq!(tempo.bpm(), 93.5);
    }

    #[test]
    fn adjust_bpm_is_relative_and_clamped() {
        let mut tempo = Tempo::new();
        tempo.adjust_bpm(15.0);
        assert_eq!(tempo.bpm(), 135.0);
        tempo.adjust_bpm(-500.0);
        assert_eq!(tempo.bpm(), MIN_BPM);
    }

    #[test]
    fn period_tracks_bpm() {
        let mut tempo = Tempo::new();
        assert!((tempo.period_ms() - 500.0).abs() < 1e-9);
        tempo.set_bpm(60.0);
        assert!((tempo.period_ms() - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn ramp_rises_then_wraps_to_zero() {
        let mut tempo = Tempo::new();
        let mut prev = tempo.ramp();
        for _ in 0..9 {
            tempo.tick(50.0).unwrap();
            assert!(!tempo.beat());
            assert!(tempo.ramp() > prev);
            assert!(tempo.ramp() < 1.0);
            prev = tempo.ramp();
        }
        tempo.tick(50.0).unwrap();
        assert!(tempo.beat());
        assert_eq!(tempo.ramp(), 0.0);
    }

    #[test]
    fn whole_period_tick_fires_exactly_once() {
        let mut tempo = Tempo::new();
        tempo.tick(BEAT_MS).unwrap();
        assert!(tempo.beat());
        assert_eq!(tempo.ramp(), 0.0);
        assert_eq!(tempo.beat_count(), 1);
    }

    #[test]
    fn oversized_tick_fires_and_keeps_phase() {
        let mut tempo = Tempo::new();
        tempo.tick(BEAT_MS * 3.5).unwrap();
        assert!(tempo.beat());
        assert!((tempo.ramp() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn measure_implies_half_implies_beat() {
        let mut tempo = Tempo::new();
        for _ in 0..16 {
            tempo.tick(BEAT_MS).unwrap();
            if tempo.measure() {
                assert!(tempo.half());
            }
            if tempo.half() {
                assert!(tempo.beat());
            }
            assert_eq!(tempo.measure(), tempo.beat() && tempo.beat_count() % 4 == 0);
        }
    }

    #[test]
    fn trigger_beats_immediately_at_the_downbeat() {
        let mut tempo = Tempo::new();
        tempo.tick(BEAT_MS).unwrap();
        tempo.tick(BEAT_MS).unwrap();
        assert_eq!(tempo.beat_count(), 2);

        tempo.trigger();
        assert!(tempo.beat());
        assert_eq!(tempo.beat_count(), 0);
        assert_eq!(tempo.ramp(), 0.0);
    }

    #[test]
    fn trigger_is_not_double_counted_by_the_next_tick() {
        let mut tempo = Tempo::new();
        tempo.trigger();
        // Even a tick spanning a whole period must not count the forced
        // firing again.
        tempo.tick(BEAT_MS).unwrap();
        assert!(tempo.beat());
        assert_eq!(tempo.beat_count(), 0);
        // Natural counting resumes afterwards.
        tempo.tick(BEAT_MS).unwrap();
        assert_eq!(tempo.beat_count(), 1);
    }

    #[test]
    fn bpm_change_mid_beat_reshapes_the_phase() {
        let mut tempo = Tempo::new();
        tempo.tick(250.0).unwrap();
        assert!((tempo.ramp() - 0.5).abs() < 1e-9);
        // Halving the tempo doubles the period; the elapsed quarter beat
        // is now only a quarter of the way through.
        tempo.set_bpm(60.0);
        assert!((tempo.ramp() - 0.25).abs() < 1e-9);
        tempo.tick(250.0).unwrap();
        assert!(!tempo.beat());
        assert!((tempo.ramp() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn four_taps_at_500ms_set_120_bpm() {
        let (mut tempo, now) = tempo_with_fake_time();
        tempo.set_bpm(100.0);
        for ms in [0.0, 500.0, 1_000.0, 1_500.0] {
            *now.lock() = ms;
            tempo.tap();
        }
        assert!((tempo.bpm() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn every_tap_retriggers_even_below_the_gate() {
        let (mut tempo, now) = tempo_with_fake_time();
        tempo.tick(BEAT_MS).unwrap();
        assert_eq!(tempo.beat_count(), 1);

        *now.lock() = 2_000.0;
        tempo.tap();
        // One tap cannot estimate a tempo, but it re-syncs the phase.
        assert_eq!(tempo.bpm(), DEFAULT_BPM);
        assert!(tempo.beat());
        assert_eq!(tempo.beat_count(), 0);
        assert_eq!(tempo.ramp(), 0.0);
    }

    #[test]
    fn stale_tap_does_not_count_toward_the_average() {
        let (mut tempo, now) = tempo_with_fake_time();
        tempo.set_bpm(100.0);
        for ms in [0.0, 400.0, 800.0] {
            *now.lock() = ms;
            tempo.tap();
        }
        // Over two seconds later: the window restarts, so three more taps
        // still leave the tempo alone.
        for ms in [3_300.0, 3_700.0, 4_100.0] {
            *now.lock() = ms;
            tempo.tap();
            assert_eq!(tempo.bpm(), 100.0);
        }
        // The fourth fresh tap completes a run at 400 ms per beat.
        *now.lock() = 4_500.0;
        tempo.tap();
        assert!((tempo.bpm() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn frantic_tapping_pins_at_max_bpm() {
        let (mut tempo, now) = tempo_with_fake_time();
        for i in 0..6 {
            *now.lock() = i as f64 * 100.0;
            tempo.tap();
        }
        assert_eq!(tempo.bpm(), MAX_BPM);
    }

    #[test]
    fn sync_tap_first_call_is_a_no_op() {
        let (mut tempo, now) = tempo_with_fake_time();
        tempo.tick(BEAT_MS).unwrap();
        let count = tempo.beat_count();

        *now.lock() = 1_000.0;
        tempo.tap_with(false);
        assert_eq!(tempo.bpm(), DEFAULT_BPM);
        // No trigger in sync mode: counter and phase are untouched.
        assert_eq!(tempo.beat_count(), count);
    }

    #[test]
    fn sync_tap_pair_sets_bpm_without_retrigger() {
        let (mut tempo, now) = tempo_with_fake_time();
        tempo.tick(200.0).unwrap();
        let ramp_before = tempo.ramp();

        *now.lock() = 1_000.0;
        tempo.tap_with(false);
        *now.lock() = 1_750.0;
        tempo.tap_with(false);
        assert!((tempo.bpm() - 80.0).abs() < 1e-9);
        assert!(!tempo.beat());
        assert!((tempo.ramp() - ramp_before * 500.0 / 750.0).abs() < 1e-9);
    }

    #[test]
    fn listeners_fire_in_the_implication_chain() {
        let mut tempo = Tempo::new();
        let counts = Arc::new(Mutex::new(Counts::default()));
        tempo.add_listener(Box::new(Recorder(counts.clone())));

        for _ in 0..8 {
            tempo.tick(BEAT_MS).unwrap();
        }
        let counts = counts.lock();
        assert_eq!(counts.beats, 8);
        assert_eq!(counts.halves, 4);
        assert_eq!(counts.measures, 2);
    }

    #[test]
    fn removed_listeners_stay_silent() {
        let mut tempo = Tempo::new();
        let first = Arc::new(Mutex::new(Counts::default()));
        let second = Arc::new(Mutex::new(Counts::default()));
        let id = tempo.add_listener(Box::new(Recorder(first.clone())));
        tempo.add_listener(Box::new(Recorder(second.clone())));

        tempo.tick(BEAT_MS).unwrap();
        tempo.remove_listener(id);
        tempo.tick(BEAT_MS).unwrap();

        assert_eq!(first.lock().beats, 1);
        assert_eq!(second.lock().beats, 2);
    }

    #[test]
    fn quiet_ticks_do_not_notify() {
        let mut tempo = Tempo::new();
        let counts = Arc::new(Mutex::new(Counts::default()));
        tempo.add_listener(Box::new(Recorder(counts.clone())));

        tempo.tick(100.0).unwrap();
        tempo.tick(100.0).unwrap();
        assert_eq!(counts.lock().beats, 0);
    }

    #[test]
    fn triggered_tick_notifies_the_downbeat() {
        let mut tempo = Tempo::new();
        let counts = Arc::new(Mutex::new(Counts::default()));
        tempo.add_listener(Box::new(Recorder(counts.clone())));

        tempo.trigger();
        tempo.tick(16.0).unwrap();
        // Count 0 is a measure boundary, so all three granularities fire.
        let counts = counts.lock();
        assert_eq!(counts.beats, 1);
        assert_eq!(counts.halves, 1);
        assert_eq!(counts.measures, 1);
    }

    #[test]
    fn negative_delta_is_rejected() {
        let mut tempo = Tempo::new();
        assert!(matches!(
            tempo.tick(-5.0),
            Err(TempoError::NegativeDelta(_))
        ));
    }
}
