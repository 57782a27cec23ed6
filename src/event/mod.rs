pub mod log;

pub use log::{BeatEvent, BeatKind, EventLog};
