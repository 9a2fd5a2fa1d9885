//! Event types for the Nocturne event system
//!
//! Events are broadcast by the playback engine to every interested listener
//! (UI bridge, statistics recorder, CLI logger) over a tokio broadcast channel.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Transport state of a playback session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No session loaded
    #[default]
    Idle,
    /// Session running, audio audible
    Playing,
    /// Session suspended by the user, position preserved
    Paused,
    /// Session timer reached zero
    Completed,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "Idle"),
            PlaybackState::Playing => write!(f, "Playing"),
            PlaybackState::Paused => write!(f, "Paused"),
            PlaybackState::Completed => write!(f, "Completed"),
        }
    }
}

/// Nocturne event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NocturneEvent {
    /// Transport state changed
    PlaybackStateChanged {
        /// Transport state before change
        old_state: PlaybackState,
        /// Transport state after change
        new_state: PlaybackState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A segment started sounding
    SegmentStarted {
        /// Catalog journey id (None for ad-hoc segment lists)
        journey_id: Option<i64>,
        /// Position of the segment within the session
        segment_index: usize,
        /// Source identifier being played
        source_id: String,
        /// When the segment started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The active segment began its fade-out ahead of an advance
    SegmentFadeOut {
        segment_index: usize,
        fade_out_sec: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Once-per-second countdown update
    PlaybackProgress {
        elapsed_secs: u64,
        remaining_secs: u64,
        segment_index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Master volume changed (0.0-1.0)
    VolumeChanged {
        volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session timer elapsed; the player should close and record the session
    SessionCompleted {
        journey_id: Option<i64>,
        elapsed_secs: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback aborted because a segment could not be loaded or played
    PlaybackFailed {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl NocturneEvent {
    /// Short event name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            NocturneEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            NocturneEvent::SegmentStarted { .. } => "SegmentStarted",
            NocturneEvent::SegmentFadeOut { .. } => "SegmentFadeOut",
            NocturneEvent::PlaybackProgress { .. } => "PlaybackProgress",
            NocturneEvent::VolumeChanged { .. } => "VolumeChanged",
            NocturneEvent::SessionCompleted { .. } => "SessionCompleted",
            NocturneEvent::PlaybackFailed { .. } => "PlaybackFailed",
        }
    }
}

/// One-to-many event distribution
///
/// Thin wrapper around `tokio::sync::broadcast`. Slow subscribers lose the
/// oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NocturneEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use nocturne_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<NocturneEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: NocturneEvent,
    ) -> Result<usize, broadcast::error::SendError<NocturneEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: NocturneEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
