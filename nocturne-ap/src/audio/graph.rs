//! AudioGraph: output context, master gain, buffer cache, one active source
//!
//! The graph is owned by exactly one scheduler. Control operations run on the
//! owning task; the output callback only sees the shared [`RenderGraph`].
//!
//! # Invariants
//!
//! - At most one source node exists at any time. `play` removes the previous
//!   node before installing the new one.
//! - A source's completion notification fires only when a non-looping buffer
//!   plays to its end; `stop` and replacement never fire it.
//! - Gain automation is scheduled on the audio clock.

use crate::audio::cache::BufferCache;
use crate::audio::context::{AudioBackend, AudioContext, ContextState};
use crate::audio::loader::BufferLoader;
use crate::audio::param::GainParam;
use crate::audio::render::{RenderGraph, SourceNode};
use crate::audio::types::{DecodedBuffer, NodeId};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Handle to a started source
#[derive(Debug)]
pub struct SourceHandle {
    pub node_id: NodeId,
    /// Resolves with `node_id` when the buffer finishes naturally.
    ///
    /// `None` for looping sources. The sender is dropped without a value when
    /// the node is stopped or replaced.
    ///
    /// Timed on tokio time from the moment `play` returns, not on the audio
    /// clock, so with a device it may fire slightly before or after the last
    /// frame is actually heard.
    pub ended: Option<oneshot::Receiver<NodeId>>,
}

pub struct AudioGraph {
    backend: Arc<dyn AudioBackend>,
    loader: Arc<dyn BufferLoader>,
    context: OnceCell<Arc<dyn AudioContext>>,
    render: Arc<Mutex<RenderGraph>>,
    cache: BufferCache,
    next_node: u64,
    end_watcher: Option<JoinHandle<()>>,
}

impl AudioGraph {
    pub fn new(backend: Arc<dyn AudioBackend>, loader: Arc<dyn BufferLoader>) -> Self {
        Self {
            backend,
            loader,
            context: OnceCell::new(),
            render: Arc::new(Mutex::new(RenderGraph::new(1.0))),
            cache: BufferCache::new(),
            next_node: 1,
            end_watcher: None,
        }
    }

    /// Create the output context on first call and make sure it is running.
    ///
    /// Repeated calls reuse the same context.
    pub async fn initialize(&self) -> Result<Arc<dyn AudioContext>> {
        let context = self
            .context
            .get_or_try_init(|| async {
                let context = self.backend.create_context(Arc::clone(&self.render))?;
                info!(
                    "Audio context created ({} backend, {} Hz)",
                    self.backend.name(),
                    context.sample_rate()
                );
                Ok::<_, Error>(context)
            })
            .await?;

        check_failure(context.as_ref())?;
        match context.state() {
            ContextState::Suspended => {
                debug!("Audio context suspended, resuming");
                context.resume().await?;
            }
            ContextState::Closed => {
                return Err(Error::InvalidState("audio context is closed".to_string()));
            }
            ContextState::Running => {}
        }

        Ok(Arc::clone(context))
    }

    pub fn is_initialized(&self) -> bool {
        self.context.initialized()
    }

    /// Fails with [`Error::AudioOutput`] once the output device has reported
    /// a failure. Fine before initialization.
    pub fn check_output(&self) -> Result<()> {
        match self.context.get() {
            Some(context) => check_failure(context.as_ref()),
            None => Ok(()),
        }
    }

    /// Decoded buffer for `source_id`, from cache or freshly loaded
    pub async fn load_buffer(&self, source_id: &str) -> Result<Arc<DecodedBuffer>> {
        let context = self.initialize().await?;
        self.cache
            .get_or_load(source_id, context.sample_rate(), self.loader.as_ref())
            .await
    }

    /// Start `buffer` now, replacing any active source.
    ///
    /// Gain ramps linearly from 0 to `target_gain` over `fade_in_secs`; a zero
    /// fade sets the target immediately.
    pub fn play(
        &mut self,
        buffer: Arc<DecodedBuffer>,
        target_gain: f32,
        fade_in_secs: f64,
        looping: bool,
    ) -> Result<SourceHandle> {
        let context = self.running_context()?;
        self.stop();

        let now = context.current_time();
        let target_gain = target_gain.clamp(0.0, 1.0);
        let mut gain = GainParam::new(0.0);
        if fade_in_secs > 0.0 {
            gain.set_value_at_time(0.0, now);
            gain.linear_ramp_to_value_at_time(target_gain, now + fade_in_secs);
        } else {
            gain.set_value_at_time(target_gain, now);
        }

        let node_id = NodeId(self.next_node);
        self.next_node += 1;
        let duration = buffer.duration_secs();

        debug!(
            "Playing '{}' as {} (gain {:.2}, fade-in {:.2}s, loop {})",
            buffer.source_id, node_id, target_gain, fade_in_secs, looping
        );

        self.render.lock().replace_source(SourceNode {
            id: node_id,
            buffer,
            gain,
            start_time: now,
            looping,
        });

        let ended = if looping {
            None
        } else {
            let (tx, rx) = oneshot::channel();
            let render = Arc::clone(&self.render);
            self.end_watcher = Some(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs_f64(duration)).await;
                let finished = render.lock().take_source_if(node_id).is_some();
                if finished {
                    debug!("{} finished naturally", node_id);
                    let _ = tx.send(node_id);
                }
            }));
            Some(rx)
        };

        Ok(SourceHandle { node_id, ended })
    }

    /// Ramp the active source's gain to `target_gain` over `duration_secs`.
    ///
    /// Starts from the gain the source has right now, including part way
    /// through another ramp. No-op without an active source.
    pub fn fade_to(&self, target_gain: f32, duration_secs: f64) {
        let Some(context) = self.context.get() else {
            return;
        };
        let now = context.current_time();
        let target_gain = target_gain.clamp(0.0, 1.0);

        let mut render = self.render.lock();
        let Some(node) = render.active_mut() else {
            return;
        };

        node.gain.cancel_and_hold_at_time(now);
        if duration_secs > 0.0 {
            node.gain
                .linear_ramp_to_value_at_time(target_gain, now + duration_secs);
        } else {
            node.gain.set_value_at_time(target_gain, now);
        }
        debug!(
            "Fading {} to {:.2} over {:.2}s",
            node.id, target_gain, duration_secs
        );
    }

    /// Halt and release the active source. Safe when nothing is playing.
    pub fn stop(&mut self) {
        if let Some(watcher) = self.end_watcher.take() {
            watcher.abort();
        }

        let now = self.context.get().map(|c| c.current_time());
        if let Some(mut node) = self.render.lock().take_source() {
            if let Some(now) = now {
                node.gain.cancel_scheduled_values(now);
            }
            debug!("Stopped {}", node.id);
        }
    }

    /// Set the master gain immediately (clamped to 0.0-1.0)
    pub fn set_master_volume(&self, level: f32) {
        self.render.lock().set_master_gain(level);
    }

    pub fn master_volume(&self) -> f32 {
        self.render.lock().master_gain()
    }

    /// Identifier of the active source node
    pub fn active_node(&self) -> Option<NodeId> {
        self.render.lock().active().map(|n| n.id)
    }

    /// Gain of the active source at audio clock `time` (master excluded)
    pub fn source_gain_at(&self, time: f64) -> Option<f32> {
        self.render.lock().active().map(|n| n.gain.value_at(time))
    }

    /// Audio clock in seconds; 0.0 before initialization
    pub fn current_time(&self) -> f64 {
        self.context.get().map(|c| c.current_time()).unwrap_or(0.0)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Number of buffer loads performed (cache hits excluded)
    pub fn decode_count(&self) -> usize {
        self.cache.load_count()
    }

    /// Stop playback, drop every cached buffer and close the context
    pub fn dispose(mut self) {
        self.stop();
        self.cache.clear();
        if let Some(context) = self.context.get() {
            context.close();
        }
        info!("Audio graph disposed");
    }

    fn running_context(&self) -> Result<Arc<dyn AudioContext>> {
        let context = self
            .context
            .get()
            .ok_or_else(|| Error::InvalidState("audio graph not initialized".to_string()))?;
        if context.state() == ContextState::Closed {
            return Err(Error::InvalidState("audio context is closed".to_string()));
        }
        check_failure(context.as_ref())?;
        Ok(Arc::clone(context))
    }
}

fn check_failure(context: &dyn AudioContext) -> Result<()> {
    match context.failure() {
        Some(reason) => Err(Error::AudioOutput(format!("audio output failed: {}", reason))),
        None => Ok(()),
    }
}

impl Drop for AudioGraph {
    fn drop(&mut self) {
        if let Some(watcher) = self.end_watcher.take() {
            watcher.abort();
        }
    }
}
