//! Segment descriptors: the scheduler's view of a journey segment

use crate::error::{Error, Result};
use nocturne_common::{Journey, Segment, SegmentType};
use serde::Serialize;

/// Defaults applied when a catalog record leaves a field out
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentDefaults {
    /// Played by segments without an audio file
    pub placeholder_source: String,
    /// Gain used when the record has none
    pub nominal_gain: f32,
}

impl Default for SegmentDefaults {
    fn default() -> Self {
        Self {
            placeholder_source: "silence.mp3".to_string(),
            nominal_gain: 0.7,
        }
    }
}

/// One planned unit of playback. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentDescriptor {
    pub segment_id: i64,
    pub kind: SegmentType,
    /// Position within the journey (0-based)
    pub position: usize,
    pub source_id: String,
    /// Target gain (0.0-1.0), independent of master volume
    pub gain: f32,
    pub fade_in_secs: f64,
    pub fade_out_secs: f64,
    /// Auto-advance after this long; `None` means "when the audio ends"
    pub duration_secs: Option<f64>,
    pub looping: bool,
    pub text: Option<String>,
}

impl SegmentDescriptor {
    /// Descriptor with zero fades, no fixed duration and no looping
    pub fn new(source_id: impl Into<String>, gain: f32) -> Self {
        Self {
            segment_id: 0,
            kind: SegmentType::Music,
            position: 0,
            source_id: source_id.into(),
            gain,
            fade_in_secs: 0.0,
            fade_out_secs: 0.0,
            duration_secs: None,
            looping: false,
            text: None,
        }
    }

    pub fn with_fades(mut self, fade_in_secs: f64, fade_out_secs: f64) -> Self {
        self.fade_in_secs = fade_in_secs;
        self.fade_out_secs = fade_out_secs;
        self
    }

    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Map one catalog segment
    pub fn from_segment(segment: &Segment, position: usize, defaults: &SegmentDefaults) -> Self {
        let content = &segment.content;
        let source_id = content
            .audio_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(&defaults.placeholder_source)
            .to_string();

        Self {
            segment_id: segment.id,
            kind: segment.segment_type,
            position,
            source_id,
            gain: content
                .gain
                .unwrap_or(defaults.nominal_gain)
                .clamp(0.0, 1.0),
            fade_in_secs: segment.fade_in_sec.max(0.0),
            fade_out_secs: segment.fade_out_sec.max(0.0),
            duration_secs: segment.duration_sec,
            looping: content.looping.unwrap_or(false),
            text: content.text.clone(),
        }
    }

    /// Map every segment of a journey in playback order
    pub fn from_journey(journey: &Journey, defaults: &SegmentDefaults) -> Result<Vec<Self>> {
        if journey.segments.is_empty() {
            return Err(Error::InvalidJourney(format!(
                "journey {} has no segments",
                journey.id
            )));
        }

        Ok(journey
            .ordered_segments()
            .into_iter()
            .enumerate()
            .map(|(position, segment)| Self::from_segment(segment, position, defaults))
            .collect())
    }
}
