//! Ordered, cancellable playback of replay-eligible events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::payload::{Event, EventBody};

pub const MIN_SPEED: f64 = 0.1;

/// Applies one timeline step to whatever is being replayed.
#[async_trait]
pub trait StepApplier: Send {
    /// Resolves once the step has settled.
    async fn apply(&mut self, event: &Event);
}

/// What a finished or cancelled run got through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackReport {
    /// Ids of the applied events, in application order.
    pub applied: Vec<u64>,
    /// Sum of the delays that were scheduled between steps.
    pub scheduled_delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineOutcome {
    Completed(PlaybackReport),
    Cancelled(PlaybackReport),
}

impl TimelineOutcome {
    pub fn report(&self) -> &PlaybackReport {
        match self {
            TimelineOutcome::Completed(report) | TimelineOutcome::Cancelled(report) => report,
        }
    }
}

pub fn clamp_speed(speed: f64) -> f64 {
    if !speed.is_finite() {
        return 1.0;
    }
    speed.max(MIN_SPEED)
}

/// Replay-eligible subsequence ordered by capture time, ties by id.
pub fn build_timeline(events: &[Event], include_mutations: bool) -> Vec<Event> {
    let mut timeline: Vec<Event> = events
        .iter()
        .filter(|event| match event.body {
            EventBody::Interaction(_) => true,
            EventBody::Mutation(_) => include_mutations,
            EventBody::Snapshot(_) | EventBody::Meta(_) => false,
        })
        .cloned()
        .collect();
    timeline.sort_by(|a, b| {
        a.time_offset_ms
            .total_cmp(&b.time_offset_ms)
            .then(a.id.cmp(&b.id))
    });
    timeline
}

/// Delay between two consecutive steps at `speed`, floored to whole ms.
pub fn step_delay(current: &Event, next: &Event, speed: f64) -> Duration {
    let gap = (next.time_offset_ms - current.time_offset_ms).max(0.0);
    let ms = (gap / clamp_speed(speed)).floor();
    if ms.is_finite() && ms > 0.0 {
        Duration::from_millis(ms as u64)
    } else {
        Duration::ZERO
    }
}

/// Applies `events` in order, sleeping between steps, until done or
/// cancelled. `cursor` tracks the index of the next step.
pub async fn run_timeline<A>(
    events: &[Event],
    speed: f64,
    applier: &mut A,
    cancel: &CancellationToken,
    cursor: &AtomicUsize,
) -> TimelineOutcome
where
    A: StepApplier + ?Sized,
{
    let speed = clamp_speed(speed);
    let mut report = PlaybackReport::default();

    for (index, event) in events.iter().enumerate() {
        if cancel.is_cancelled() {
            return TimelineOutcome::Cancelled(report);
        }
        cursor.store(index, Ordering::SeqCst);
        applier.apply(event).await;
        report.applied.push(event.id);
        cursor.store(index + 1, Ordering::SeqCst);

        let Some(next) = events.get(index + 1) else {
            break;
        };
        let delay = step_delay(event, next, speed);
        report.scheduled_delay += delay;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(applied = report.applied.len(), "Timeline cancelled");
                return TimelineOutcome::Cancelled(report);
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    TimelineOutcome::Completed(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{Interaction, Meta, ScrollPosition};
    use tokio::time::Instant;

    fn scroll(id: u64, offset: f64) -> Event {
        Event {
            id,
            at: offset,
            time_offset_ms: offset,
            body: EventBody::Interaction(Interaction::Scroll(ScrollPosition {
                target: "document".into(),
                is_trusted: Some(true),
                scroll_x: 0.0,
                scroll_y: offset,
            })),
        }
    }

    #[derive(Default)]
    struct Collect {
        seen: Vec<(u64, Instant)>,
    }

    #[async_trait]
    impl StepApplier for Collect {
        async fn apply(&mut self, event: &Event) {
            self.seen.push((event.id, Instant::now()));
        }
    }

    #[test]
    fn test_build_timeline_orders_by_offset_then_id() {
        let mut meta = scroll(1, 0.0);
        meta.body = EventBody::Meta(Meta {
            action: "x".into(),
            dropped_event_count: None,
            redaction_stats: None,
        });
        let events = vec![meta, scroll(4, 30.0), scroll(3, 10.0), scroll(2, 10.0)];
        let ids: Vec<u64> = build_timeline(&events, true).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_speed_clamp_and_delay() {
        assert_eq!(clamp_speed(0.0), MIN_SPEED);
        assert_eq!(clamp_speed(f64::NAN), 1.0);
        assert_eq!(
            step_delay(&scroll(1, 0.0), &scroll(2, 101.0), 2.0),
            Duration::from_millis(50)
        );
        assert_eq!(
            step_delay(&scroll(1, 50.0), &scroll(2, 10.0), 1.0),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_timeline_sleeps_between_steps() {
        let events = vec![scroll(1, 0.0), scroll(2, 200.0), scroll(3, 500.0)];
        let mut applier = Collect::default();
        let cursor = AtomicUsize::new(0);
        let start = Instant::now();

        let outcome = run_timeline(
            &events,
            2.0,
            &mut applier,
            &CancellationToken::new(),
            &cursor,
        )
        .await;

        let report = outcome.report().clone();
        assert!(matches!(outcome, TimelineOutcome::Completed(_)));
        assert_eq!(report.applied, vec![1, 2, 3]);
        assert_eq!(report.scheduled_delay, Duration::from_millis(250));
        assert_eq!(applier.seen[2].1 - start, Duration::from_millis(250));
        assert_eq!(cursor.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_pending_step() {
        let events = vec![scroll(1, 0.0), scroll(2, 10_000.0)];
        let cancel = CancellationToken::new();
        let cursor = AtomicUsize::new(0);
        let mut applier = Collect::default();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let outcome = run_timeline(&events, 1.0, &mut applier, &cancel, &cursor).await;

        assert!(matches!(outcome, TimelineOutcome::Cancelled(_)));
        assert_eq!(outcome.report().applied, vec![1]);
    }
}
