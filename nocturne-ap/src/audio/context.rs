//! Audio output contexts
//!
//! An [`AudioBackend`] creates the platform output context on demand. The
//! context renders the shared [`RenderGraph`] and exposes the audio clock
//! that all gain automation is scheduled against.
//!
//! Two backends exist:
//! - [`CpalBackend`](crate::audio::output::CpalBackend): a real sound device;
//!   the clock counts rendered frames.
//! - [`HeadlessBackend`]: no device; the clock follows tokio time, so it runs
//!   under `tokio::time::pause()` in tests and on machines without audio.

use crate::audio::render::RenderGraph;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// Lifecycle state of an output context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created but not rendering; the clock is frozen
    Suspended,
    Running,
    /// Released; cannot be resumed
    Closed,
}

/// A live audio output context
#[async_trait]
pub trait AudioContext: Send + Sync {
    fn state(&self) -> ContextState;

    /// Start (or restart) rendering
    async fn resume(&self) -> Result<()>;

    /// Audio clock in seconds; monotonic, frozen while suspended
    fn current_time(&self) -> f64;

    fn sample_rate(&self) -> u32;

    /// Failure the device reported since the context opened.
    ///
    /// Once set the clock no longer advances reliably and the context must
    /// not be used for playback.
    fn failure(&self) -> Option<String> {
        None
    }

    /// Release the output; terminal
    fn close(&self);
}

/// Factory for output contexts
pub trait AudioBackend: Send + Sync {
    /// Create a context rendering `render`.
    ///
    /// Fails with [`Error::AudioUnsupported`] when the platform has no usable
    /// output.
    fn create_context(&self, render: Arc<Mutex<RenderGraph>>) -> Result<Arc<dyn AudioContext>>;

    fn name(&self) -> &'static str;
}

/// Device-less backend driven by tokio time
#[derive(Debug, Clone)]
pub struct HeadlessBackend {
    sample_rate: u32,
    start_suspended: bool,
}

impl HeadlessBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            start_suspended: false,
        }
    }

    /// Create contexts in the `Suspended` state, the way a browser does
    /// before the first user gesture
    pub fn start_suspended(mut self, suspended: bool) -> Self {
        self.start_suspended = suspended;
        self
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(44100)
    }
}

impl AudioBackend for HeadlessBackend {
    fn create_context(&self, _render: Arc<Mutex<RenderGraph>>) -> Result<Arc<dyn AudioContext>> {
        let context = HeadlessContext::new(self.sample_rate, self.start_suspended);
        debug!(
            "Created headless audio context ({} Hz, {:?})",
            self.sample_rate,
            context.state()
        );
        Ok(Arc::new(context))
    }

    fn name(&self) -> &'static str {
        "headless"
    }
}

/// Backend that never has an output, for platforms without audio
#[derive(Debug, Clone, Default)]
pub struct UnsupportedBackend;

impl AudioBackend for UnsupportedBackend {
    fn create_context(&self, _render: Arc<Mutex<RenderGraph>>) -> Result<Arc<dyn AudioContext>> {
        Err(Error::AudioUnsupported(
            "no audio output available on this platform".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "unsupported"
    }
}

#[derive(Debug)]
struct ClockState {
    state: ContextState,
    /// Clock value accumulated before the current run
    offset: f64,
    /// When the current run began
    resumed_at: Option<Instant>,
}

/// Output context without a device.
///
/// Nothing is rendered; gain values and the active node are read straight
/// from the render graph the [`AudioGraph`](crate::audio::AudioGraph) owns.
pub struct HeadlessContext {
    sample_rate: u32,
    clock: Mutex<ClockState>,
}

impl HeadlessContext {
    pub fn new(sample_rate: u32, suspended: bool) -> Self {
        let clock = if suspended {
            ClockState {
                state: ContextState::Suspended,
                offset: 0.0,
                resumed_at: None,
            }
        } else {
            ClockState {
                state: ContextState::Running,
                offset: 0.0,
                resumed_at: Some(Instant::now()),
            }
        };

        Self {
            sample_rate,
            clock: Mutex::new(clock),
        }
    }
}

#[async_trait]
impl AudioContext for HeadlessContext {
    fn state(&self) -> ContextState {
        self.clock.lock().state
    }

    async fn resume(&self) -> Result<()> {
        let mut clock = self.clock.lock();
        match clock.state {
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                clock.state = ContextState::Running;
                clock.resumed_at = Some(Instant::now());
                Ok(())
            }
            ContextState::Closed => Err(Error::InvalidState(
                "cannot resume a closed audio context".to_string(),
            )),
        }
    }

    fn current_time(&self) -> f64 {
        let clock = self.clock.lock();
        match clock.resumed_at {
            Some(at) if clock.state == ContextState::Running => {
                clock.offset + at.elapsed().as_secs_f64()
            }
            _ => clock.offset,
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(&self) {
        let mut clock = self.clock.lock();
        if let Some(at) = clock.resumed_at.take() {
            clock.offset += at.elapsed().as_secs_f64();
        }
        clock.state = ContextState::Closed;
    }
}
