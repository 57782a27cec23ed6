use serde::{Deserialize, Serialize};

/// Where a command originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandSource {
    Keys,
    Headless,
}

/// Control input for the clock thread
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Tap at a monotonic timestamp captured at the input site, so bus
    /// latency cannot stretch the measured tap intervals
    Tap { smoothing: bool, at_ms: f64 },
    /// Re-sync the beat to now
    Trigger,
    SetBpm(f64),
    AdjustBpm(f64),
    /// Stop the clock thread
    Quit,
}
