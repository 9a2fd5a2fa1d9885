//! Journey catalog records
//!
//! A journey is the unit the catalog hands to the player: a titled list of
//! segments, each describing one timed piece of narration, music, ambience
//! or a control action. Records arrive as JSON with snake_case keys.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kind of a journey segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    /// Spoken guidance
    Narration,
    /// Background music
    Music,
    /// Sound effect or ambience
    Sfx,
    /// Control action (fade, pause marker)
    Action,
}

/// Free-form segment payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentContent {
    /// Audio file name or URL; narration segments may omit it
    #[serde(default)]
    pub audio_url: Option<String>,

    /// Target gain (0.0-1.0)
    #[serde(default)]
    pub gain: Option<f32>,

    /// Whether the source loops until the segment is advanced
    #[serde(default, rename = "loop")]
    pub looping: Option<bool>,

    /// Narration script
    #[serde(default)]
    pub text: Option<String>,
}

/// One segment of a journey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: i64,

    #[serde(default)]
    pub journey_id: Option<i64>,

    /// Nominal start offset within the journey (seconds)
    #[serde(default)]
    pub time_sec: u32,

    /// Execution order
    pub order: u32,

    #[serde(rename = "type")]
    pub segment_type: SegmentType,

    #[serde(default)]
    pub content: SegmentContent,

    /// Fixed playback length; None means "until the audio ends"
    #[serde(default)]
    pub duration_sec: Option<f64>,

    #[serde(default)]
    pub fade_in_sec: f64,

    #[serde(default)]
    pub fade_out_sec: f64,
}

/// A sleep journey as served by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    pub id: i64,
    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Nominal total length (seconds)
    pub duration_sec: u32,

    #[serde(default)]
    pub thumbnail_url: Option<String>,

    /// nature, meditation, story, ...
    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Journey {
    /// Parse and validate a journey from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let journey: Journey = serde_json::from_str(json)?;
        journey.validate()?;
        Ok(journey)
    }

    /// Read, parse and validate a journey file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Check the invariants the player relies on
    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(Error::InvalidInput(format!(
                "journey {} has no segments",
                self.id
            )));
        }

        for segment in &self.segments {
            if !(segment.fade_in_sec >= 0.0) || !(segment.fade_out_sec >= 0.0) {
                return Err(Error::InvalidInput(format!(
                    "segment {} has a negative fade",
                    segment.id
                )));
            }
            if let Some(duration) = segment.duration_sec {
                if !(duration > 0.0) {
                    return Err(Error::InvalidInput(format!(
                        "segment {} duration must be positive",
                        segment.id
                    )));
                }
            }
            if let Some(gain) = segment.content.gain {
                if !(0.0..=1.0).contains(&gain) {
                    return Err(Error::InvalidInput(format!(
                        "segment {} gain {} outside 0.0-1.0",
                        segment.id, gain
                    )));
                }
            }
        }

        Ok(())
    }

    /// Segments in playback order (by `order`, then `time_sec`)
    pub fn ordered_segments(&self) -> Vec<&Segment> {
        let mut segments: Vec<&Segment> = self.segments.iter().collect();
        segments.sort_by_key(|s| (s.order, s.time_sec));
        segments
    }
}
