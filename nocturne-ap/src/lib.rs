//! # Nocturne Audio Player Library (nocturne-ap)
//!
//! Segment playback for guided sleep journeys.
//!
//! **Purpose:** Sequence a journey's narration, music and ambience segments
//! into one listening session with gain fades, a countdown timer and
//! pause/resume/stop control.
//!
//! **Architecture:** An [`audio::AudioGraph`] (symphonia + rubato + cpal)
//! driven by a [`playback::SegmentScheduler`] that runs inside a single tokio
//! actor task ([`playback::PlaybackEngine`]).

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod state;

pub use error::{Error, Result};
pub use playback::{PlaybackEngine, PlaybackHandle};
pub use state::{PlaybackStatus, SharedState};
