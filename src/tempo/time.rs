use std::time::Instant;

/// Monotonic time source for tap timestamps.
///
/// Injectable so tap-tempo logic stays deterministic under test, and
/// monotonic so a system clock adjustment cannot warp tap intervals.
pub trait TimeSource: Send {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> f64;
}

/// `Instant`-backed clock anchored at construction.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1_000.0
    }
}
