//! # Nocturne Common Library
//!
//! Shared code for the Nocturne playback components including:
//! - Journey catalog records (Journey / Segment)
//! - Event types (NocturneEvent enum) and the broadcast EventBus
//! - Bootstrap configuration loading
//! - Human-readable time formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod journey;

pub use error::{Error, Result};
pub use events::{EventBus, NocturneEvent, PlaybackState};
pub use journey::{Journey, Segment, SegmentContent, SegmentType};
