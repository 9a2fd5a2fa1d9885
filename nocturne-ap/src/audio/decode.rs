//! Audio decoding using symphonia
//!
//! Decodes a complete in-memory file into interleaved stereo f32.
//!
//! # Supported Formats
//!
//! Per Cargo.toml symphonia features: MP3, FLAC, AAC, MP4/M4A, Vorbis, WAV.
//!
//! # Sample Format
//!
//! - Output: Stereo f32 samples (interleaved: [L, R, L, R, ...])
//! - Mono files: duplicated to stereo
//! - Multi-channel: downmixed to stereo

use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Fully decoded stereo audio at the file's native rate
#[derive(Debug)]
pub struct DecodedAudio {
    /// Interleaved stereo f32 samples [L, R, L, R, ...]
    pub samples: Vec<f32>,

    /// Native sample rate of the file
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frame_count(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Decode a whole file held in memory.
///
/// `extension` is a format hint (e.g. `"mp3"`); probing falls back to
/// content sniffing when it is absent or wrong. Errors are returned as
/// plain messages; the caller wraps them with the source identifier.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio, String> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("unsupported format: {}", e))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| "no audio track found".to_string())?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| "unknown sample rate".to_string())?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| format!("unsupported codec: {}", e))?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(format!("read error: {}", e)),
        };

        // Skip packets from other tracks
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // Corrupt frame; skip it and keep going
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(format!("decode error: {}", e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
        });
        if buf.capacity() < decoded.capacity() * channels {
            *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        }
        buf.copy_interleaved_ref(decoded);

        append_stereo(&mut samples, buf.samples(), channels);
    }

    if samples.is_empty() {
        return Err("no audio frames decoded".to_string());
    }

    debug!(
        "Decoded {} frames at {} Hz",
        samples.len() / 2,
        sample_rate
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Append interleaved samples with `channels` channels as stereo
fn append_stereo(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            // Mono: duplicate to stereo
            for &sample in interleaved {
                out.push(sample);
                out.push(sample);
            }
        }
        2 => out.extend_from_slice(interleaved),
        _ => {
            // Multi-channel: even channels to the left, odd to the right
            let half = channels as f32 / 2.0;
            for frame in interleaved.chunks_exact(channels) {
                let mut left = 0.0f32;
                let mut right = 0.0f32;
                for (ch, sample) in frame.iter().enumerate() {
                    if ch % 2 == 0 {
                        left += sample;
                    } else {
                        right += sample;
                    }
                }
                out.push(left / half);
                out.push(right / half);
            }
        }
    }
}
