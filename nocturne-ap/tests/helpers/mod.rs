//! Shared fixtures for nocturne-ap integration tests
//!
//! Tests run on paused tokio time with a synthetic loader, so a 30 minute
//! session completes instantly and deterministically.

#![allow(dead_code)]

use async_trait::async_trait;
use nocturne_ap::audio::context::HeadlessContext;
use nocturne_ap::audio::render::RenderGraph;
use nocturne_ap::audio::{
    AudioBackend, AudioContext, AudioGraph, BufferLoader, ContextState, DecodedBuffer,
    HeadlessBackend,
};
use nocturne_ap::playback::{SegmentDescriptor, SegmentScheduler};
use nocturne_ap::{Error, Result};
use nocturne_common::events::{EventBus, NocturneEvent};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Sample rate used by every synthetic buffer
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Level of every sample in a synthetic buffer
pub const TEST_LEVEL: f32 = 0.5;

/// Loader producing constant-level stereo buffers without touching disk
pub struct SyntheticLoader {
    durations: Mutex<HashMap<String, f64>>,
    default_duration: f64,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    per_source: Mutex<HashMap<String, usize>>,
}

impl SyntheticLoader {
    /// Every source lasts `default_duration` seconds unless overridden
    pub fn new(default_duration: f64) -> Self {
        Self {
            durations: Mutex::new(HashMap::new()),
            default_duration,
            failing: Mutex::new(HashSet::new()),
            delay: None,
            calls: AtomicUsize::new(0),
            per_source: Mutex::new(HashMap::new()),
        }
    }

    /// Simulated fetch latency
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_duration(self, source_id: &str, secs: f64) -> Self {
        self.durations.lock().insert(source_id.to_string(), secs);
        self
    }

    pub fn fail(&self, source_id: &str) {
        self.failing.lock().insert(source_id.to_string());
    }

    pub fn heal(&self, source_id: &str) {
        self.failing.lock().remove(source_id);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, source_id: &str) -> usize {
        self.per_source.lock().get(source_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BufferLoader for SyntheticLoader {
    async fn load(&self, source_id: &str, sample_rate: u32) -> Result<DecodedBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_source
            .lock()
            .entry(source_id.to_string())
            .or_default() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(source_id) {
            return Err(Error::AudioLoad {
                source_id: source_id.to_string(),
                reason: "synthetic failure".to_string(),
            });
        }

        let secs = self
            .durations
            .lock()
            .get(source_id)
            .copied()
            .unwrap_or(self.default_duration);
        let frames = (secs * sample_rate as f64).round() as usize;
        Ok(DecodedBuffer::new(
            source_id,
            vec![TEST_LEVEL; frames * 2],
            sample_rate,
            2,
        ))
    }
}

/// Headless output whose device can be failed mid-session
#[derive(Default)]
pub struct FlakyBackend {
    failure: Arc<Mutex<Option<String>>>,
}

impl FlakyBackend {
    /// Report a stream error on every context this backend created
    pub fn fail(&self, reason: &str) {
        *self.failure.lock() = Some(reason.to_string());
    }
}

impl AudioBackend for FlakyBackend {
    fn create_context(&self, _render: Arc<Mutex<RenderGraph>>) -> Result<Arc<dyn AudioContext>> {
        Ok(Arc::new(FlakyContext {
            inner: HeadlessContext::new(TEST_SAMPLE_RATE, false),
            failure: Arc::clone(&self.failure),
        }))
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

struct FlakyContext {
    inner: HeadlessContext,
    failure: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl AudioContext for FlakyContext {
    fn state(&self) -> ContextState {
        self.inner.state()
    }

    async fn resume(&self) -> Result<()> {
        self.inner.resume().await
    }

    fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    fn close(&self) {
        self.inner.close()
    }
}

pub fn headless_graph(loader: Arc<SyntheticLoader>) -> AudioGraph {
    AudioGraph::new(Arc::new(HeadlessBackend::new(TEST_SAMPLE_RATE)), loader)
}

/// Scheduler on a headless graph, with an event receiver subscribed before
/// anything happens
pub fn scheduler(
    loader: Arc<SyntheticLoader>,
) -> (SegmentScheduler, broadcast::Receiver<NocturneEvent>) {
    let events = EventBus::new(4096);
    let rx = events.subscribe();
    (SegmentScheduler::new(headless_graph(loader), events, 100), rx)
}

/// Segment A: 5s fixed duration with a 1s fade-out
pub fn segment_a() -> SegmentDescriptor {
    SegmentDescriptor::new("a.mp3", 0.5)
        .with_fades(0.0, 1.0)
        .with_duration(5.0)
}

/// Segment B: plays until its audio ends, 2s fade-in
pub fn segment_b() -> SegmentDescriptor {
    SegmentDescriptor::new("b.mp3", 0.8).with_fades(2.0, 0.0)
}

/// Drive the scheduler's timers and source-end notifications for `duration`
/// of (paused) tokio time, the way the engine task does.
pub async fn run_for(scheduler: &mut SegmentScheduler, duration: Duration) {
    let until = Instant::now() + duration;
    loop {
        let wake = match scheduler.next_deadline() {
            Some(deadline) if deadline < until => deadline,
            _ => until,
        };

        tokio::select! {
            _ = tokio::time::sleep_until(wake) => {
                scheduler.process_due().await;
                // Entries scheduled for this same instant run on the next pass
                let settled = scheduler
                    .next_deadline()
                    .map_or(true, |deadline| deadline > Instant::now());
                if wake == until && settled {
                    return;
                }
            }
            ended = scheduler.source_ended() => {
                if let Some(node) = ended {
                    scheduler.on_source_ended(node).await;
                }
            }
        }
    }
}

/// Every event currently queued on `rx`
pub fn drain(rx: &mut broadcast::Receiver<NocturneEvent>) -> Vec<NocturneEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Source ids of `SegmentStarted` events, in order
pub fn started_sources(events: &[NocturneEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            NocturneEvent::SegmentStarted { source_id, .. } => Some(source_id.clone()),
            _ => None,
        })
        .collect()
}

/// Gain of the active source right now
pub fn gain_now(scheduler: &SegmentScheduler) -> Option<f32> {
    let graph = scheduler.graph();
    graph.source_gain_at(graph.current_time())
}

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}
