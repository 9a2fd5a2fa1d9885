//! Core audio data types

use std::fmt;

/// Decoded, resampled audio ready for playback.
///
/// **Format:**
/// - Samples are f32 (floating point -1.0 to 1.0)
/// - Stereo interleaved: [L, R, L, R, ...]
/// - Sample rate matches the audio context that requested the load
#[derive(Debug, Clone)]
pub struct DecodedBuffer {
    /// Source identifier the buffer was loaded from
    pub source_id: String,

    /// PCM audio samples (interleaved)
    pub samples: Vec<f32>,

    pub sample_rate: u32,

    /// Channel count (always 2 after decode)
    pub channel_count: u16,

    /// Number of frames (samples.len() / channel_count)
    pub frame_count: usize,
}

impl DecodedBuffer {
    pub fn new(source_id: impl Into<String>, samples: Vec<f32>, sample_rate: u32, channel_count: u16) -> Self {
        let frame_count = samples.len() / channel_count.max(1) as usize;
        Self {
            source_id: source_id.into(),
            samples,
            sample_rate,
            channel_count,
            frame_count,
        }
    }

    /// Stereo silence of the given length
    pub fn silence(source_id: impl Into<String>, duration_secs: f64, sample_rate: u32) -> Self {
        let frames = (duration_secs.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(source_id, vec![0.0; frames * 2], sample_rate, 2)
    }

    /// Get duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Get audio frame at specific frame index
    pub fn frame(&self, frame_index: usize) -> Option<AudioFrame> {
        if frame_index >= self.frame_count {
            return None;
        }
        let base = frame_index * self.channel_count as usize;
        let left = self.samples[base];
        let right = if self.channel_count > 1 {
            self.samples[base + 1]
        } else {
            left
        };
        Some(AudioFrame { left, right })
    }
}

/// A single stereo sample (one frame of audio)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFrame {
    pub left: f32,
    pub right: f32,
}

impl AudioFrame {
    pub fn zero() -> Self {
        AudioFrame { left: 0.0, right: 0.0 }
    }

    /// Linear interpolation between two frames (`t` in 0.0-1.0)
    pub fn lerp(self, other: AudioFrame, t: f32) -> AudioFrame {
        AudioFrame {
            left: self.left + (other.left - self.left) * t,
            right: self.right + (other.right - self.right) * t,
        }
    }

    pub fn scaled(self, gain: f32) -> AudioFrame {
        AudioFrame {
            left: self.left * gain,
            right: self.right * gain,
        }
    }
}

/// Identifier of a playback node created by [`AudioGraph::play`](crate::audio::AudioGraph::play)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}
