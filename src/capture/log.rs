use crate::payload::{Event, EventBody, RedactionStats};

/// Bounded, sequenced event buffer for one recording.
///
/// Ids start at 1 and increase by one per stored event. Offsets are
/// milliseconds since `started_at`, rounded to microseconds and never
/// decreasing. Once `max_events` non-meta events are stored, further
/// non-meta events are counted as dropped.
#[derive(Debug, Clone)]
pub struct CaptureLog {
    started_at: f64,
    next_id: u64,
    last_at: f64,
    last_offset: f64,
    events: Vec<Event>,
    stored: usize,
    max_events: usize,
    dropped: u64,
    pub stats: RedactionStats,
}

impl CaptureLog {
    pub fn new(started_at: f64, max_events: usize) -> Self {
        Self {
            started_at,
            next_id: 1,
            last_at: started_at,
            last_offset: 0.0,
            events: Vec::new(),
            stored: 0,
            max_events,
            dropped: 0,
            stats: RedactionStats::default(),
        }
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    pub fn set_max_events(&mut self, max_events: usize) {
        self.max_events = max_events;
    }

    /// Appends an event sampled at clock time `at`. Returns its id, or
    /// `None` if it was dropped.
    pub fn append(&mut self, at: f64, body: EventBody) -> Option<u64> {
        if !body.is_meta() && self.stored >= self.max_events {
            if self.dropped == 0 {
                tracing::debug!(
                    max_events = self.max_events,
                    "Event buffer full, dropping further events"
                );
            }
            self.dropped += 1;
            return None;
        }
        if !body.is_meta() {
            self.stored += 1;
        }

        let at = if at.is_finite() { at.max(self.last_at) } else { self.last_at };
        let offset = round_micros(at - self.started_at).max(self.last_offset);
        self.last_at = at;
        self.last_offset = offset;

        let id = self.next_id;
        self.next_id += 1;
        self.events.push(Event {
            id,
            at: round_micros(at),
            time_offset_ms: offset,
            body,
        });
        Some(id)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

fn round_micros(ms: f64) -> f64 {
    (ms * 1000.0).round() / 1000.0
}
