//! Ordered set of scheduled playback events
//!
//! Entries are keyed by (deadline, sequence number) so events due at the same
//! instant fire in the order they were scheduled. Cancellation removes the
//! entry outright: a cancelled event can never be returned by `pop_due`.
//!
//! `pop_due` only returns entries scheduled before a given [`EventId`], so a
//! handler that schedules a new entry for "now" cannot keep one drain pass
//! running forever.

use std::collections::BTreeMap;
use tokio::time::Instant;

/// Identity of a scheduled event, used to cancel it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

/// What a scheduled event does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineEvent {
    /// One-second countdown tick
    Tick,
    /// Begin fading out segment `index` ahead of its advance
    FadeOut { index: usize },
    /// Move on from segment `index`
    Advance { index: usize },
    /// Release the source after the completion fade
    FinishStop,
}

/// An event taken off the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueEvent {
    pub id: EventId,
    pub deadline: Instant,
    pub event: TimelineEvent,
}

#[derive(Debug, Default)]
pub struct Timeline {
    entries: BTreeMap<(Instant, u64), TimelineEvent>,
    next_seq: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Instant, event: TimelineEvent) -> EventId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((deadline, seq), event);
        EventId(seq)
    }

    /// Remove one event; returns whether it was still pending
    pub fn cancel(&mut self, id: EventId) -> bool {
        let key = self
            .entries
            .keys()
            .find(|(_, seq)| *seq == id.0)
            .copied();
        match key {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Id the next scheduled event will receive
    pub fn watermark(&self) -> EventId {
        EventId(self.next_seq)
    }

    /// Remove and return the earliest event due at or before `now` that was
    /// scheduled before `watermark`
    pub fn pop_due(&mut self, now: Instant, watermark: EventId) -> Option<DueEvent> {
        let (deadline, seq) = self
            .entries
            .keys()
            .take_while(|(deadline, _)| *deadline <= now)
            .find(|(_, seq)| *seq < watermark.0)
            .copied()?;
        let event = self.entries.remove(&(deadline, seq))?;
        Some(DueEvent {
            id: EventId(seq),
            deadline,
            event,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pop_in_deadline_then_schedule_order() {
        let base = Instant::now();
        let mut timeline = Timeline::new();
        timeline.schedule(base + Duration::from_secs(2), TimelineEvent::Tick);
        timeline.schedule(base + Duration::from_secs(1), TimelineEvent::FadeOut { index: 0 });
        timeline.schedule(base + Duration::from_secs(1), TimelineEvent::Advance { index: 0 });

        let now = base + Duration::from_secs(1);
        let mark = timeline.watermark();
        assert_eq!(
            timeline.pop_due(now, mark).map(|d| d.event),
            Some(TimelineEvent::FadeOut { index: 0 })
        );
        assert_eq!(
            timeline.pop_due(now, mark).map(|d| d.event),
            Some(TimelineEvent::Advance { index: 0 })
        );
        assert!(timeline.pop_due(now, mark).is_none());
        assert_eq!(timeline.next_deadline(), Some(base + Duration::from_secs(2)));
    }

    #[test]
    fn test_cancelled_event_never_fires() {
        let base = Instant::now();
        let mut timeline = Timeline::new();
        let id = timeline.schedule(base, TimelineEvent::Advance { index: 3 });

        assert!(timeline.cancel(id));
        assert!(!timeline.cancel(id));
        let mark = timeline.watermark();
        assert!(timeline.pop_due(base + Duration::from_secs(60), mark).is_none());
    }

    #[test]
    fn test_entries_past_watermark_wait() {
        let base = Instant::now();
        let mut timeline = Timeline::new();
        timeline.schedule(base, TimelineEvent::FadeOut { index: 0 });
        let mark = timeline.watermark();
        timeline.schedule(base, TimelineEvent::Advance { index: 0 });
        let late = timeline.schedule(base, TimelineEvent::Tick);

        assert_eq!(
            timeline.pop_due(base, mark).map(|d| d.event),
            Some(TimelineEvent::FadeOut { index: 0 })
        );
        assert!(timeline.pop_due(base, mark).is_none());
        assert_eq!(timeline.len(), 2);

        // A later pass picks them up in order
        let mark = timeline.watermark();
        assert_eq!(
            timeline.pop_due(base, mark).map(|d| d.event),
            Some(TimelineEvent::Advance { index: 0 })
        );
        assert_eq!(timeline.pop_due(base, mark).map(|d| d.id), Some(late));
    }

    #[test]
    fn test_cancel_all() {
        let base = Instant::now();
        let mut timeline = Timeline::new();
        timeline.schedule(base, TimelineEvent::Tick);
        timeline.schedule(base, TimelineEvent::FinishStop);
        timeline.cancel_all();
        assert!(timeline.is_empty());
        assert_eq!(timeline.next_deadline(), None);
    }
}
