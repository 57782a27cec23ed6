use std::mem;

use super::TempoError;

/// Free-running phase oscillator - fires whenever the phase wraps a period
/// boundary, and exposes the continuous phase as `basis()` in `[0, 1)`.
pub struct Clock {
    period_ms: f64,
    elapsed_ms: f64,
    fired: bool,
    // Set by fire(); keeps the firing visible through the next advance so
    // the tick that follows a forced fire still observes it.
    forced: bool,
}

impl Clock {
    pub fn new(period_ms: f64) -> Self {
        Self {
            period_ms,
            elapsed_ms: 0.0,
            fired: false,
            forced: false,
        }
    }

    pub fn period(&self) -> f64 {
        self.period_ms
    }

    /// Update the period without disturbing the current phase, so a tempo
    /// change mid-beat reshapes the remaining phase instead of restarting it.
    pub fn set_period(&mut self, period_ms: f64) {
        self.period_ms = period_ms;
    }

    /// Advance the phase by `delta_ms`. Returns whether a period boundary
    /// was crossed (or a forced firing is pending) on this tick.
    pub fn advance(&mut self, delta_ms: f64) -> Result<bool, TempoError> {
        if self.period_ms <= 0.0 {
            return Err(TempoError::InvalidPeriod(self.period_ms));
        }
        if delta_ms < 0.0 {
            return Err(TempoError::NegativeDelta(delta_ms));
        }

        self.fired = mem::take(&mut self.forced);
        self.elapsed_ms += delta_ms;
        if self.elapsed_ms >= self.period_ms {
            // Single modulo, not one subtraction per elapsed period: a
            // stalled driver can hand us a delta spanning thousands of
            // periods in one call.
            self.elapsed_ms %= self.period_ms;
            self.fired = true;
        }
        Ok(self.fired)
    }

    /// Phase within the current period, in `[0, 1)`.
    pub fn basis(&self) -> f64 {
        if self.period_ms <= 0.0 {
            return 0.0;
        }
        // A period shrunk below the accumulated phase (tempo raised
        // mid-beat) can transiently push the ratio past 1 until the next
        // advance wraps it; keep the query surface in range.
        (self.elapsed_ms / self.period_ms).fract()
    }

    /// True on the tick where the phase wrapped; latched until the next
    /// advance, so repeated queries within one tick agree.
    pub fn fired(&self) -> bool {
        self.fired
    }

    /// Force an immediate firing and re-zero the phase, independent of the
    /// natural period timing.
    pub fn fire(&mut self) {
        self.elapsed_ms = 0.0;
        self.fired = true;
        self.forced = true;
    }
}
