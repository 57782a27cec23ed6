pub mod clock;
pub mod engine;
pub mod tap;
pub mod time;

pub use clock::Clock;
pub use engine::{ListenerId, Tempo, TempoListener, TempoSnapshot};
pub use tap::TapState;
pub use time::{MonotonicClock, TimeSource};

use thiserror::Error;

/// Lowest settable tempo
pub const MIN_BPM: f64 = 20.0;
/// Highest settable tempo
pub const MAX_BPM: f64 = 240.0;
/// Startup tempo
pub const DEFAULT_BPM: f64 = 120.0;
/// Tap runs with a gap above this are restarted from scratch
pub const STALE_GAP_MS: f64 = 2_000.0;

/// Milliseconds per minute, the BPM-to-period conversion factor
pub(crate) const MINUTE_MS: f64 = 60_000.0;

/// Errors at the tempo engine boundary
#[derive(Debug, Error)]
pub enum TempoError {
    /// Zero or negative oscillator period. Cannot occur while BPM stays
    /// inside its clamped range, but the oscillator guards it anyway.
    #[error("oscillator period must be positive, got {0} ms")]
    InvalidPeriod(f64),
    /// The tick driver handed us time running backwards.
    #[error("tick delta must be non-negative, got {0} ms")]
    NegativeDelta(f64),
}
