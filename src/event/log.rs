use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Beat boundary granularity. A measure start also fires half and beat;
/// the log keeps one entry per listener callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeatKind {
    Beat,
    Half,
    Measure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatEvent {
    pub id: u64,
    /// Wall-clock milliseconds, for log readability only; tap estimation
    /// never reads this
    pub timestamp: u64,
    pub kind: BeatKind,
    pub bpm: f64,
    pub beat_count: u32,
}

/// Ring buffer of recent beat events for inspection and JSON dumps
pub struct EventLog {
    events: VecDeque<BeatEvent>,
    next_id: u64,
    max_events: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 1,
            max_events: 500,
        }
    }

    /// Record a fired boundary
    pub fn record(&mut self, kind: BeatKind, bpm: f64, beat_count: u32) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let event = BeatEvent {
            id: self.next_id,
            timestamp,
            kind,
            bpm,
            beat_count,
        };

        self.next_id += 1;
        self.events.push_back(event);

        // Trim old events
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
    }

    /// Get all events since a given ID
    pub fn events_since(&self, since_id: u64) -> Vec<BeatEvent> {
        self.events
            .iter()
            .filter(|e| e.id > since_id)
            .cloned()
            .collect()
    }

    /// Get the latest event ID
    pub fn latest_id(&self) -> u64 {
        self.events.back().map(|e| e.id).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
