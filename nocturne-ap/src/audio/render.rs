//! Render graph: master gain plus at most one source node
//!
//! The render graph is the only state shared between the control task and
//! the output callback. It sits behind a `parking_lot::Mutex`; the callback
//! holds the lock for one output buffer at a time.

use crate::audio::param::GainParam;
use crate::audio::types::{AudioFrame, DecodedBuffer, NodeId};
use std::sync::Arc;

/// A buffer bound to a gain parameter, started at a point on the audio clock
#[derive(Debug, Clone)]
pub struct SourceNode {
    pub id: NodeId,
    pub buffer: Arc<DecodedBuffer>,
    pub gain: GainParam,
    /// Audio clock time at which frame 0 plays
    pub start_time: f64,
    pub looping: bool,
}

impl SourceNode {
    /// Source frame at audio clock `time`, before gain.
    ///
    /// Returns silence before the start, and after the end for non-looping
    /// sources. Positions between frames are linearly interpolated, which
    /// also covers a buffer whose rate differs from the output rate.
    pub fn frame_at(&self, time: f64) -> AudioFrame {
        let buffer = &self.buffer;
        if buffer.frame_count == 0 || time < self.start_time {
            return AudioFrame::zero();
        }

        let mut position = (time - self.start_time) * buffer.sample_rate as f64;
        let length = buffer.frame_count as f64;
        if position >= length {
            if !self.looping {
                return AudioFrame::zero();
            }
            position %= length;
        }

        let index = position.floor() as usize;
        let fraction = (position - index as f64) as f32;
        let current = buffer.frame(index).unwrap_or_else(AudioFrame::zero);
        if fraction == 0.0 {
            return current;
        }

        let next_index = if index + 1 < buffer.frame_count {
            Some(index + 1)
        } else if self.looping {
            Some(0)
        } else {
            None
        };
        let next = next_index
            .and_then(|i| buffer.frame(i))
            .unwrap_or_else(AudioFrame::zero);
        current.lerp(next, fraction)
    }
}

/// Master gain and the active source
#[derive(Debug)]
pub struct RenderGraph {
    master_gain: f32,
    active: Option<SourceNode>,
}

impl RenderGraph {
    pub fn new(master_gain: f32) -> Self {
        Self {
            master_gain: master_gain.clamp(0.0, 1.0),
            active: None,
        }
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn set_master_gain(&mut self, level: f32) {
        self.master_gain = level.clamp(0.0, 1.0);
    }

    pub fn active(&self) -> Option<&SourceNode> {
        self.active.as_ref()
    }

    pub fn active_mut(&mut self) -> Option<&mut SourceNode> {
        self.active.as_mut()
    }

    /// Install `node` as the only source, returning the one it replaced
    pub fn replace_source(&mut self, node: SourceNode) -> Option<SourceNode> {
        self.active.replace(node)
    }

    /// Remove the active source
    pub fn take_source(&mut self) -> Option<SourceNode> {
        self.active.take()
    }

    /// Remove the active source only if it is `id`
    pub fn take_source_if(&mut self, id: NodeId) -> Option<SourceNode> {
        if self.active.as_ref().map(|n| n.id) == Some(id) {
            self.active.take()
        } else {
            None
        }
    }

    /// Mixed output frame at audio clock `time`
    pub fn frame_at(&self, time: f64) -> AudioFrame {
        match &self.active {
            Some(node) => {
                let gain = node.gain.value_at(time) * self.master_gain;
                node.frame_at(time).scaled(gain)
            }
            None => AudioFrame::zero(),
        }
    }

    /// Fill an interleaved output buffer.
    ///
    /// `start_time` is the audio clock time of the first frame. Channels
    /// beyond two are left silent; a mono device receives the left channel.
    pub fn render(&self, output: &mut [f32], channels: usize, sample_rate: u32, start_time: f64) {
        let channels = channels.max(1);
        let step = 1.0 / sample_rate.max(1) as f64;

        for (i, frame) in output.chunks_mut(channels).enumerate() {
            let value = self.frame_at(start_time + i as f64 * step);
            frame[0] = value.left.clamp(-1.0, 1.0);
            if channels > 1 {
                frame[1] = value.right.clamp(-1.0, 1.0);
            }
            for sample in frame.iter_mut().skip(2) {
                *sample = 0.0;
            }
        }
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new(1.0)
    }
}
