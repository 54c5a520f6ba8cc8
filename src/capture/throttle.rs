//! Rate limiting for high-frequency interaction streams, driven by clock
//! samples rather than timers.
//!
//! A lane holds at most one pending item. The host's clock advances only
//! when signals arrive or the recorder is ticked, so a pending item is
//! emitted at the earlier of its due time and the moment it is flushed.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    /// Emit the latest item once the stream has been quiet for the window.
    Debounce,
    /// Emit at most one item per window, the latest one seen.
    Sample,
}

#[derive(Debug, Clone)]
struct Pending<K, T> {
    key: K,
    item: T,
    due: f64,
}

#[derive(Debug, Clone)]
pub struct Throttle<K, T> {
    pace: Pace,
    window_ms: f64,
    pending: Option<Pending<K, T>>,
    last_emit: Option<f64>,
}

impl<K: PartialEq, T> Throttle<K, T> {
    pub fn new(pace: Pace, window_ms: u64) -> Self {
        Self {
            pace,
            window_ms: window_ms as f64,
            pending: None,
            last_emit: None,
        }
    }

    pub fn set_window(&mut self, window_ms: u64) {
        self.window_ms = window_ms as f64;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.last_emit = None;
    }

    /// Offers an item observed at `now`. Returns the items to emit, in
    /// order, with the clock time each should be stamped with.
    pub fn offer(&mut self, key: K, item: T, now: f64) -> Vec<(T, f64)> {
        let mut out = Vec::new();
        if let Some(due) = self.poll(now) {
            out.push(due);
        }
        if self.pending.as_ref().is_some_and(|p| p.key != key) {
            out.extend(self.take_pending(now));
        }

        match self.pace {
            Pace::Debounce if self.window_ms <= 0.0 => out.push((item, now)),
            Pace::Debounce => {
                self.pending = Some(Pending {
                    key,
                    item,
                    due: now + self.window_ms,
                });
            }
            Pace::Sample => {
                let open = self
                    .last_emit
                    .map(|last| now - last >= self.window_ms)
                    .unwrap_or(true);
                if open && self.pending.is_none() {
                    self.last_emit = Some(now);
                    out.push((item, now));
                } else {
                    let due = match &self.pending {
                        Some(pending) => pending.due,
                        None => self.last_emit.unwrap_or(now) + self.window_ms,
                    };
                    self.pending = Some(Pending { key, item, due });
                }
            }
        }
        out
    }

    /// Takes the pending item if it is due at `now`.
    pub fn poll(&mut self, now: f64) -> Option<(T, f64)> {
        if self.pending.as_ref().is_some_and(|p| p.due <= now) {
            return self.take_pending(now);
        }
        None
    }

    /// Takes the pending item regardless of its due time.
    pub fn take_pending(&mut self, now: f64) -> Option<(T, f64)> {
        let pending = self.pending.take()?;
        let at = pending.due.min(now);
        if self.pace == Pace::Sample {
            self.last_emit = Some(at);
        }
        Some((pending.item, at))
    }
}
