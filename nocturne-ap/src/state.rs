//! Shared playback state
//!
//! The engine task publishes a [`PlaybackStatus`] snapshot here after every
//! command and every timer or source event, so UI polling never waits on the
//! engine.

use crate::playback::segment::SegmentDescriptor;
use nocturne_common::events::{EventBus, NocturneEvent};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

pub use nocturne_common::events::PlaybackState;

/// Point-in-time view of the playback session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub segment_index: usize,
    /// Descriptor of the current segment (None when idle)
    pub segment: Option<SegmentDescriptor>,
    pub segment_count: usize,
    /// Master volume as shown to the user (0-100)
    pub volume_percent: u8,
    pub journey_id: Option<i64>,
    /// Why the last session was aborted, if it was
    pub last_error: Option<String>,
}

impl PlaybackStatus {
    pub fn idle(volume_percent: u8) -> Self {
        Self {
            state: PlaybackState::Idle,
            elapsed_secs: 0,
            remaining_secs: 0,
            segment_index: 0,
            segment: None,
            segment_count: 0,
            volume_percent,
            journey_id: None,
            last_error: None,
        }
    }
}

/// Shared state accessible by the engine and its handles
pub struct SharedState {
    status: RwLock<PlaybackStatus>,
    events: EventBus,
}

impl SharedState {
    pub fn new(events: EventBus, initial: PlaybackStatus) -> Self {
        Self {
            status: RwLock::new(initial),
            events,
        }
    }

    pub async fn status(&self) -> PlaybackStatus {
        self.status.read().await.clone()
    }

    pub async fn set_status(&self, status: PlaybackStatus) {
        *self.status.write().await = status;
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<NocturneEvent> {
        self.events.subscribe()
    }
}
