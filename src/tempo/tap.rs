use super::{MINUTE_MS, STALE_GAP_MS};

/// Converts a stream of tap timestamps into beat-period estimates.
///
/// Timestamps are supplied by the caller in monotonic milliseconds; the
/// estimator itself never reads a clock, which keeps it deterministic
/// under test.
#[derive(Debug, Default)]
pub struct TapState {
    first_tap_ms: f64,
    last_tap_ms: Option<f64>,
    tap_count: u32,
}

impl TapState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Smoothing tap: averages the inter-tap interval across the whole run.
    ///
    /// A gap longer than the stale window restarts the run. Returns a raw
    /// (unclamped) BPM estimate once at least four taps have landed;
    /// earlier taps return `None`.
    pub fn tap(&mut self, now_ms: f64) -> Option<f64> {
        match self.last_tap_ms {
            Some(last) if now_ms - last > STALE_GAP_MS => {
                self.first_tap_ms = now_ms;
                self.tap_count = 0;
            }
            Some(_) => {}
            None => self.first_tap_ms = now_ms,
        }
        self.last_tap_ms = Some(now_ms);
        self.tap_count += 1;

        if self.tap_count > 3 {
            // Average over the whole run, not just the last pair.
            let beat_period = (now_ms - self.first_tap_ms) / (self.tap_count - 1) as f64;
            if beat_period > 0.0 {
                return Some(MINUTE_MS / beat_period);
            }
        }
        None
    }

    /// Single-pair tap for following an external clock: the estimate comes
    /// from only the immediately preceding tap, with no averaging and no
    /// staleness reset.
    ///
    /// The very first call ever has no reference interval and is ignored;
    /// so is a zero-length interval.
    pub fn tap_sync(&mut self, now_ms: f64) -> Option<f64> {
        let last = match self.last_tap_ms {
            Some(last) => last,
            None => {
                self.last_tap_ms = Some(now_ms);
                return None;
            }
        };
        self.first_tap_ms = last;
        self.last_tap_ms = Some(now_ms);

        let beat_period = now_ms - last;
        if beat_period > 0.0 {
            Some(MINUTE_MS / beat_period)
        } else {
            None
        }
    }
}
