//! Audio output using cpal
//!
//! The cpal `Stream` is not `Send` on every platform, so each context owns a
//! dedicated output thread that builds the stream and then waits for control
//! messages (play, pause, close). The render callback locks the shared
//! [`RenderGraph`] once per device buffer and advances a frame counter that
//! serves as the audio clock.
//!
//! A stream error (device unplugged, backend gone) stops that clock. The
//! first error is kept and reported through [`AudioContext::failure`].

use crate::audio::context::{AudioBackend, AudioContext, ContextState};
use crate::audio::render::RenderGraph;
use crate::error::{Error, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, error, info, warn};

/// Preferred output sample rate
pub const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// Backend that opens a cpal output device
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    device_name: Option<String>,
    start_suspended: bool,
}

impl CpalBackend {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            start_suspended: false,
        }
    }

    pub fn start_suspended(mut self, suspended: bool) -> Self {
        self.start_suspended = suspended;
        self
    }

    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }
}

impl AudioBackend for CpalBackend {
    fn create_context(&self, render: Arc<Mutex<RenderGraph>>) -> Result<Arc<dyn AudioContext>> {
        let context = CpalContext::open(self.device_name.clone(), render, self.start_suspended)?;
        Ok(Arc::new(context))
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

enum StreamCommand {
    Play(mpsc::Sender<Result<()>>),
    Close,
}

const STATE_SUSPENDED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Output context backed by a cpal stream
pub struct CpalContext {
    sample_rate: u32,
    frames_rendered: Arc<AtomicU64>,
    state: AtomicU8,
    failure: Arc<Mutex<Option<String>>>,
    control: Mutex<mpsc::Sender<StreamCommand>>,
}

impl CpalContext {
    /// Open the device and build the stream on a dedicated output thread
    pub fn open(
        device_name: Option<String>,
        render: Arc<Mutex<RenderGraph>>,
        start_suspended: bool,
    ) -> Result<Self> {
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let failure = Arc::new(Mutex::new(None));
        let (control_tx, control_rx) = mpsc::channel::<StreamCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16)>>();

        let frames = Arc::clone(&frames_rendered);
        let errors = Arc::clone(&failure);
        thread::Builder::new()
            .name("nocturne-output".to_string())
            .spawn(move || {
                let stream = match build_stream(device_name, render, frames, errors) {
                    Ok((stream, rate, channels)) => {
                        let _ = ready_tx.send(Ok((rate, channels)));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                run_output_thread(stream, control_rx);
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?;

        let (sample_rate, channels) = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread exited during setup".to_string()))??;

        let context = Self {
            sample_rate,
            frames_rendered,
            state: AtomicU8::new(STATE_SUSPENDED),
            failure,
            control: Mutex::new(control_tx),
        };

        if !start_suspended {
            context.play_blocking()?;
        }

        info!(
            "Audio output ready: {} Hz, {} channels, {:?}",
            sample_rate,
            channels,
            context.state()
        );
        Ok(context)
    }

    fn play_blocking(&self) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.control
            .lock()
            .send(StreamCommand::Play(reply_tx))
            .map_err(|_| Error::AudioOutput("Output thread is gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread is gone".to_string()))??;
        self.state.store(STATE_RUNNING, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl AudioContext for CpalContext {
    fn state(&self) -> ContextState {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => ContextState::Running,
            STATE_CLOSED => ContextState::Closed,
            _ => ContextState::Suspended,
        }
    }

    async fn resume(&self) -> Result<()> {
        match self.state() {
            ContextState::Running => Ok(()),
            ContextState::Closed => Err(Error::InvalidState(
                "cannot resume a closed audio context".to_string(),
            )),
            ContextState::Suspended => self.play_blocking(),
        }
    }

    fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    fn close(&self) {
        if self.state.swap(STATE_CLOSED, Ordering::SeqCst) != STATE_CLOSED {
            let _ = self.control.lock().send(StreamCommand::Close);
            info!("Audio output closed");
        }
    }
}

impl Drop for CpalContext {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_output_thread(stream: Stream, control: mpsc::Receiver<StreamCommand>) {
    while let Ok(command) = control.recv() {
        match command {
            StreamCommand::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)));
                let _ = reply.send(result);
            }
            StreamCommand::Close => break,
        }
    }

    if let Err(e) = stream.pause() {
        warn!("Failed to pause stream on close: {}", e);
    }
    debug!("Output thread exiting");
}

fn open_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioUnsupported(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(dev) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok(dev);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let dev = host
        .default_output_device()
        .ok_or_else(|| Error::AudioUnsupported("No default output device found".to_string()))?;
    info!(
        "Using audio device: {}",
        dev.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(dev)
}

/// Prefer 44.1kHz stereo f32; otherwise take the device default.
fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported_configs = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported_configs.find(|config| {
        config.channels() == 2
            && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
            && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
            && config.sample_format() == SampleFormat::F32
    });

    if let Some(supported) = preferred {
        let sample_format = supported.sample_format();
        let config = supported
            .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE))
            .config();
        return Ok((config, sample_format));
    }

    let supported = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    Ok((supported.config(), supported.sample_format()))
}

fn build_stream(
    device_name: Option<String>,
    render: Arc<Mutex<RenderGraph>>,
    frames_rendered: Arc<AtomicU64>,
    failure: Arc<Mutex<Option<String>>>,
) -> Result<(Stream, u32, u16)> {
    let device = open_device(device_name.as_deref())?;
    let (config, sample_format) = best_config(&device)?;
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        sample_rate, channels, sample_format
    );

    let on_error = move |err: cpal::StreamError| {
        error!("Audio stream error: {}", err);
        record_failure(&failure, &err.to_string());
    };

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                render_block(&render, &frames_rendered, data, channels as usize, sample_rate);
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => {
            let mut scratch = Vec::new();
            device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    render_block(&render, &frames_rendered, &mut scratch, channels as usize, sample_rate);
                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = (sample * i16::MAX as f32) as i16;
                    }
                },
                on_error,
                None,
            )
        }
        SampleFormat::U16 => {
            let mut scratch = Vec::new();
            device.build_output_stream(
                &config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    render_block(&render, &frames_rendered, &mut scratch, channels as usize, sample_rate);
                    for (out, sample) in data.iter_mut().zip(&scratch) {
                        *out = ((sample + 1.0) * 32767.5) as u16;
                    }
                },
                on_error,
                None,
            )
        }
        other => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    }
    .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))?;

    Ok((stream, sample_rate, channels))
}

/// Keep the first stream error; later ones are usually its echoes
fn record_failure(failure: &Mutex<Option<String>>, message: &str) {
    failure.lock().get_or_insert_with(|| message.to_string());
}

fn render_block(
    render: &Mutex<RenderGraph>,
    frames_rendered: &AtomicU64,
    data: &mut [f32],
    channels: usize,
    sample_rate: u32,
) {
    let frames = (data.len() / channels.max(1)) as u64;
    let start_frame = frames_rendered.load(Ordering::Acquire);
    let start_time = start_frame as f64 / sample_rate as f64;

    render.lock().render(data, channels, sample_rate, start_time);
    frames_rendered.store(start_frame + frames, Ordering::Release);
}
