//! Audio resampling using rubato
//!
//! Converts decoded audio to the output context's sample rate so the render
//! path can step through buffers frame for frame. Input is fed in fixed
//! chunks; the resampler's output delay is trimmed so the result lines up
//! with the source and holds `frames * ratio` frames.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Input frames per rubato call
const CHUNK_FRAMES: usize = 4096;

/// Sample rate conversion for interleaved buffers
pub struct Resampler;

impl Resampler {
    /// Resample interleaved audio from `input_rate` to `output_rate`.
    ///
    /// Returns a copy when the rates already match.
    pub fn resample(
        input: &[f32],
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>, String> {
        if channels == 0 || input_rate == 0 || output_rate == 0 {
            return Err(format!(
                "invalid resample parameters: {} Hz -> {} Hz, {} channels",
                input_rate, output_rate, channels
            ));
        }
        if input_rate == output_rate {
            return Ok(input.to_vec());
        }

        let lanes = split_channels(input, channels as usize);
        let frames = lanes[0].len();
        if frames == 0 {
            return Ok(Vec::new());
        }

        let ratio = output_rate as f64 / input_rate as f64;
        let expected = (frames as f64 * ratio).round() as usize;
        debug!(
            "Resampling {} frames {} Hz -> {} Hz",
            frames, input_rate, output_rate
        );

        let mut resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0,
            PolynomialDegree::Septic,
            CHUNK_FRAMES,
            channels as usize,
        )
        .map_err(|e| format!("failed to create resampler: {}", e))?;
        let delay = resampler.output_delay();

        let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); lanes.len()];
        let mut position = 0;

        while frames - position >= resampler.input_frames_next() {
            let take = resampler.input_frames_next();
            let chunk: Vec<&[f32]> = lanes
                .iter()
                .map(|lane| &lane[position..position + take])
                .collect();
            let block = resampler
                .process(chunk.as_slice(), None)
                .map_err(|e| format!("resampling failed: {}", e))?;
            extend_lanes(&mut out, block);
            position += take;
        }

        if position < frames {
            let tail: Vec<&[f32]> = lanes.iter().map(|lane| &lane[position..]).collect();
            let block = resampler
                .process_partial(Some(tail.as_slice()), None)
                .map_err(|e| format!("resampling failed: {}", e))?;
            extend_lanes(&mut out, block);
        }

        // Drain what the filter still holds
        while out[0].len() < expected + delay {
            let block = resampler
                .process_partial::<&[f32]>(None, None)
                .map_err(|e| format!("resampling failed: {}", e))?;
            if block.first().map_or(true, |lane| lane.is_empty()) {
                break;
            }
            extend_lanes(&mut out, block);
        }

        let end = out[0].len().min(expected + delay);
        let start = delay.min(end);
        let mut interleaved = Vec::with_capacity((end - start) * lanes.len());
        for frame in start..end {
            for lane in &out {
                interleaved.push(lane[frame]);
            }
        }
        Ok(interleaved)
    }
}

/// Split interleaved samples into one vector per channel
fn split_channels(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut lanes = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (lane, &sample) in lanes.iter_mut().zip(frame) {
            lane.push(sample);
        }
    }
    lanes
}

fn extend_lanes(out: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (lane, produced) in out.iter_mut().zip(block) {
        lane.extend(produced);
    }
}
