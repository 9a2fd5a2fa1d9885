//! Segment scheduler: sequences segments into one listening session
//!
//! # State Machine
//!
//! ```text
//!            start                pause
//!   Idle ─────────────▶ Playing ─────────▶ Paused
//!    ▲                   │  ▲ ◀───────────   │
//!    │                   │  │    resume      │
//!    │      countdown 0  │  └─ auto-advance  │
//!    │                   ▼                   │
//!    └──── stop ─────  Completed  ◀── stop ──┘   (stop works from any state)
//! ```
//!
//! # Timing
//!
//! Wall-clock work (countdown ticks, fade-out triggers, advances) lives on
//! the [`Timeline`]. Gain ramps are handed to the [`AudioGraph`] and run on
//! the audio clock. For a segment with a fixed duration the fade-out starts
//! at `max(0, duration - fade_out)` and the advance fires `fade_out` later,
//! so the fade completes as the segment's nominal duration ends.
//!
//! Segments without a fixed duration advance when their buffer finishes.
//!
//! Every transition that ends a segment cancels its timeline entries before
//! touching the audio graph.

use crate::audio::{AudioGraph, NodeId};
use crate::error::{Error, Result};
use crate::playback::segment::{SegmentDefaults, SegmentDescriptor};
use crate::playback::timeline::{EventId, Timeline, TimelineEvent};
use crate::state::PlaybackStatus;
use nocturne_common::events::{EventBus, NocturneEvent, PlaybackState};
use nocturne_common::human_time::{format_clock, minutes_to_secs};
use nocturne_common::Journey;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const TICK: Duration = Duration::from_secs(1);

/// Result of a transport command that may not apply in the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    /// Command not valid in the current state; nothing changed
    Ignored,
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::from_secs(u32::MAX as u64))
}

pub struct SegmentScheduler {
    graph: AudioGraph,
    events: EventBus,
    state: PlaybackState,
    journey_id: Option<i64>,
    segments: Vec<SegmentDescriptor>,
    index: usize,
    elapsed_secs: u64,
    remaining_secs: u64,
    volume_percent: u8,
    timeline: Timeline,
    /// Fade-out/advance entries belonging to the current segment
    segment_timers: Vec<EventId>,
    active: Option<NodeId>,
    ended: Option<oneshot::Receiver<NodeId>>,
    last_error: Option<String>,
}

impl SegmentScheduler {
    pub fn new(graph: AudioGraph, events: EventBus, volume_percent: u8) -> Self {
        let volume_percent = volume_percent.min(100);
        graph.set_master_volume(volume_percent as f32 / 100.0);

        Self {
            graph,
            events,
            state: PlaybackState::Idle,
            journey_id: None,
            segments: Vec::new(),
            index: 0,
            elapsed_secs: 0,
            remaining_secs: 0,
            volume_percent,
            timeline: Timeline::new(),
            segment_timers: Vec::new(),
            active: None,
            ended: None,
            last_error: None,
        }
    }

    // ------------------------------------------------------------------
    // Transport commands
    // ------------------------------------------------------------------

    /// Map `journey` and start it
    pub async fn start_journey(
        &mut self,
        journey: &Journey,
        defaults: &SegmentDefaults,
        timer_minutes: f64,
    ) -> Result<()> {
        match SegmentDescriptor::from_journey(journey, defaults) {
            Ok(segments) => self.start(Some(journey.id), segments, timer_minutes).await,
            Err(e) => Err(self.abort_session(e)),
        }
    }

    /// Start a new session from segment 0, tearing down any current one.
    ///
    /// Fails if the segment list is empty, a segment has a fixed duration
    /// that is not positive, the timer rounds to zero seconds, or the first
    /// segment cannot be loaded or played. On failure the
    /// scheduler is left `Idle`.
    pub async fn start(
        &mut self,
        journey_id: Option<i64>,
        segments: Vec<SegmentDescriptor>,
        timer_minutes: f64,
    ) -> Result<()> {
        self.teardown();

        if segments.is_empty() {
            let err = Error::InvalidJourney("no segments to play".to_string());
            return Err(self.abort_session(err));
        }
        if let Some(segment) = segments
            .iter()
            .find(|s| s.duration_secs.is_some_and(|d| !(d > 0.0)))
        {
            let err = Error::InvalidJourney(format!(
                "segment {} ('{}') has a non-positive duration",
                segment.position, segment.source_id
            ));
            return Err(self.abort_session(err));
        }
        let total_secs = minutes_to_secs(timer_minutes);
        if total_secs == 0 {
            return Err(self.abort_session(Error::InvalidTimer(timer_minutes)));
        }

        info!(
            "Starting session: journey {:?}, {} segments, timer {}",
            journey_id,
            segments.len(),
            format_clock(total_secs)
        );

        self.journey_id = journey_id;
        self.segments = segments;
        self.index = 0;
        self.elapsed_secs = 0;
        self.remaining_secs = total_secs;
        self.last_error = None;

        if let Err(e) = self.graph.initialize().await {
            return Err(self.abort_session(e));
        }

        self.timeline.schedule(Instant::now() + TICK, TimelineEvent::Tick);
        if let Err(e) = self.play_current().await {
            return Err(self.abort_session(e));
        }

        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Suspend the session, keeping segment index and elapsed time
    pub fn pause(&mut self) -> CommandOutcome {
        if self.state != PlaybackState::Playing {
            debug!("pause ignored in state {}", self.state);
            return CommandOutcome::Ignored;
        }

        self.teardown();
        self.set_state(PlaybackState::Paused);
        CommandOutcome::Applied
    }

    /// Continue a paused session; the current segment replays from its start
    pub async fn resume(&mut self) -> Result<CommandOutcome> {
        if self.state != PlaybackState::Paused {
            debug!("resume ignored in state {}", self.state);
            return Ok(CommandOutcome::Ignored);
        }

        if let Err(e) = self.graph.initialize().await {
            return Err(self.abort_session(e));
        }

        self.timeline.schedule(Instant::now() + TICK, TimelineEvent::Tick);
        if let Err(e) = self.play_current().await {
            return Err(self.abort_session(e));
        }

        self.set_state(PlaybackState::Playing);
        Ok(CommandOutcome::Applied)
    }

    /// Halt everything and reset the session. Valid from any state.
    pub fn stop(&mut self) -> CommandOutcome {
        self.teardown();
        self.reset_session();
        self.set_state(PlaybackState::Idle);
        CommandOutcome::Applied
    }

    /// Set master volume from a percentage (clamped to 0-100)
    pub fn set_volume(&mut self, percent: u8) {
        let percent = percent.min(100);
        self.volume_percent = percent;
        let level = percent as f32 / 100.0;
        self.graph.set_master_volume(level);

        debug!("Volume set to {}%", percent);
        self.emit(NocturneEvent::VolumeChanged {
            volume: level,
            timestamp: chrono::Utc::now(),
        });
    }

    // ------------------------------------------------------------------
    // Event sources
    // ------------------------------------------------------------------

    /// Deadline of the earliest pending timeline entry
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timeline.next_deadline()
    }

    /// Fire every timeline entry that is due.
    ///
    /// Entries scheduled by the handlers themselves wait for the next call.
    pub async fn process_due(&mut self) {
        let now = Instant::now();
        let watermark = self.timeline.watermark();
        while let Some(due) = self.timeline.pop_due(now, watermark) {
            self.segment_timers.retain(|id| *id != due.id);
            match due.event {
                TimelineEvent::Tick => self.on_tick(due.deadline),
                TimelineEvent::FadeOut { index } => self.on_fade_out(index, due.deadline),
                TimelineEvent::Advance { index } => {
                    if self.state == PlaybackState::Playing && index == self.index {
                        self.advance().await;
                    }
                }
                TimelineEvent::FinishStop => {
                    self.graph.stop();
                    self.active = None;
                }
            }
        }
    }

    /// Wait for the active source to finish naturally.
    ///
    /// Pending forever when no source can finish (none active, looping, or
    /// governed by a fixed duration). Cancel safe.
    pub async fn source_ended(&mut self) -> Option<NodeId> {
        match self.ended.as_mut() {
            Some(rx) => {
                let result = rx.await.ok();
                self.ended = None;
                result
            }
            None => std::future::pending().await,
        }
    }

    /// React to a source finishing naturally
    pub async fn on_source_ended(&mut self, node: NodeId) {
        if self.state != PlaybackState::Playing || self.active != Some(node) {
            debug!("Ignoring end of stale {}", node);
            return;
        }
        self.active = None;
        self.advance().await;
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            state: self.state,
            elapsed_secs: self.elapsed_secs,
            remaining_secs: self.remaining_secs,
            segment_index: self.index,
            segment: self.segments.get(self.index).cloned(),
            segment_count: self.segments.len(),
            volume_percent: self.volume_percent,
            journey_id: self.journey_id,
            last_error: self.last_error.clone(),
        }
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    /// Number of pending timeline entries
    pub fn pending_events(&self) -> usize {
        self.timeline.len()
    }

    /// Tear down the session and release the audio graph
    pub fn dispose(mut self) {
        self.teardown();
        self.graph.dispose();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn play_current(&mut self) -> Result<()> {
        let segment = self
            .segments
            .get(self.index)
            .cloned()
            .ok_or_else(|| Error::InvalidState(format!("no segment at index {}", self.index)))?;

        let buffer = self.graph.load_buffer(&segment.source_id).await?;
        let handle = self.graph.play(
            buffer,
            segment.gain,
            segment.fade_in_secs,
            segment.looping,
        )?;

        self.active = Some(handle.node_id);
        // A fixed duration governs the advance; the buffer's own end does not
        self.ended = match segment.duration_secs {
            Some(_) => None,
            None => handle.ended,
        };

        info!(
            "Segment {}/{} started: '{}'",
            self.index + 1,
            self.segments.len(),
            segment.source_id
        );
        self.emit(NocturneEvent::SegmentStarted {
            journey_id: self.journey_id,
            segment_index: self.index,
            source_id: segment.source_id.clone(),
            timestamp: chrono::Utc::now(),
        });

        if let Some(duration) = segment.duration_secs {
            let lead = (duration - segment.fade_out_secs).max(0.0);
            let id = self.timeline.schedule(
                Instant::now() + secs(lead),
                TimelineEvent::FadeOut { index: self.index },
            );
            self.segment_timers.push(id);
        }

        Ok(())
    }

    fn on_tick(&mut self, deadline: Instant) {
        if self.state != PlaybackState::Playing {
            return;
        }
        if let Err(e) = self.graph.check_output() {
            error!("Output device lost: {}", e);
            self.abort_session(e);
            return;
        }

        self.elapsed_secs += 1;
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        self.emit(NocturneEvent::PlaybackProgress {
            elapsed_secs: self.elapsed_secs,
            remaining_secs: self.remaining_secs,
            segment_index: self.index,
            timestamp: chrono::Utc::now(),
        });

        if self.remaining_secs == 0 {
            self.complete();
        } else {
            self.timeline.schedule(deadline + TICK, TimelineEvent::Tick);
        }
    }

    fn on_fade_out(&mut self, index: usize, deadline: Instant) {
        if self.state != PlaybackState::Playing || index != self.index {
            return;
        }

        let fade_out = self.segments[index].fade_out_secs;
        self.graph.fade_to(0.0, fade_out);
        self.emit(NocturneEvent::SegmentFadeOut {
            segment_index: index,
            fade_out_sec: fade_out,
            timestamp: chrono::Utc::now(),
        });

        let id = self
            .timeline
            .schedule(deadline + secs(fade_out), TimelineEvent::Advance { index });
        self.segment_timers.push(id);
    }

    /// Move to the next segment, wrapping to 0 after the last
    async fn advance(&mut self) {
        for id in self.segment_timers.drain(..) {
            self.timeline.cancel(id);
        }
        self.ended = None;

        self.index = (self.index + 1) % self.segments.len();
        debug!("Advancing to segment {}", self.index);

        if let Err(e) = self.play_current().await {
            error!("Auto-advance failed: {}", e);
            self.abort_session(e);
        }
    }

    /// Countdown reached zero: fade the current segment out, then release it
    fn complete(&mut self) {
        self.timeline.cancel_all();
        self.segment_timers.clear();
        self.ended = None;

        let fade_out = self
            .segments
            .get(self.index)
            .map(|s| s.fade_out_secs)
            .unwrap_or(0.0);
        if fade_out > 0.0 {
            self.graph.fade_to(0.0, fade_out);
            self.timeline
                .schedule(Instant::now() + secs(fade_out), TimelineEvent::FinishStop);
        } else {
            self.graph.stop();
            self.active = None;
        }

        info!("Session completed after {}", format_clock(self.elapsed_secs));
        self.set_state(PlaybackState::Completed);
        self.emit(NocturneEvent::SessionCompleted {
            journey_id: self.journey_id,
            elapsed_secs: self.elapsed_secs,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Cancel every pending entry, then halt audio
    fn teardown(&mut self) {
        self.timeline.cancel_all();
        self.segment_timers.clear();
        self.ended = None;
        self.active = None;
        self.graph.stop();
    }

    fn reset_session(&mut self) {
        self.segments.clear();
        self.journey_id = None;
        self.index = 0;
        self.elapsed_secs = 0;
        self.remaining_secs = 0;
    }

    /// End the session after a failure; returns the error for propagation
    fn abort_session(&mut self, err: Error) -> Error {
        warn!("Playback aborted: {}", err);
        self.teardown();
        self.reset_session();
        self.last_error = Some(err.to_string());
        self.emit(NocturneEvent::PlaybackFailed {
            message: err.to_string(),
            timestamp: chrono::Utc::now(),
        });
        self.set_state(PlaybackState::Idle);
        err
    }

    fn set_state(&mut self, new_state: PlaybackState) {
        let old_state = self.state;
        if old_state == new_state {
            return;
        }
        self.state = new_state;
        info!("Playback state {} -> {}", old_state, new_state);
        self.emit(NocturneEvent::PlaybackStateChanged {
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    fn emit(&self, event: NocturneEvent) {
        self.events.emit_lossy(event);
    }
}
