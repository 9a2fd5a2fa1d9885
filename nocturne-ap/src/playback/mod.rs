//! Segment scheduling and the playback engine actor

pub mod engine;
pub mod scheduler;
pub mod segment;
pub mod timeline;

pub use engine::{EngineConfig, PlaybackEngine, PlaybackHandle};
pub use scheduler::{CommandOutcome, SegmentScheduler};
pub use segment::{SegmentDefaults, SegmentDescriptor};
