//! Playback engine actor
//!
//! One tokio task owns the [`SegmentScheduler`] (and through it the
//! [`AudioGraph`]). Commands arrive over an mpsc channel and are handled one
//! at a time; a `start` that is waiting on a buffer load holds back every
//! later command until it finishes. Between commands the task waits on the
//! next timeline deadline and on the active source's natural end.
//!
//! The scheduler's status is published to [`SharedState`] after every
//! command and every timer or source event.

use crate::audio::AudioGraph;
use crate::error::{Error, Result};
use crate::playback::scheduler::{CommandOutcome, SegmentScheduler};
use crate::playback::segment::SegmentDefaults;
use crate::state::{PlaybackStatus, SharedState};
use nocturne_common::events::{EventBus, NocturneEvent};
use nocturne_common::Journey;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Command channel depth
const COMMAND_CAPACITY: usize = 32;

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub defaults: SegmentDefaults,
    /// Initial master volume (percent)
    pub initial_volume: u8,
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            defaults: SegmentDefaults::default(),
            initial_volume: 80,
            event_capacity: 256,
        }
    }
}

enum Command {
    Start {
        journey: Box<Journey>,
        timer_minutes: f64,
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        reply: oneshot::Sender<CommandOutcome>,
    },
    Resume {
        reply: oneshot::Sender<Result<CommandOutcome>>,
    },
    Stop {
        reply: oneshot::Sender<CommandOutcome>,
    },
    SetVolume {
        percent: u8,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub struct PlaybackEngine {
    scheduler: SegmentScheduler,
    commands: mpsc::Receiver<Command>,
    shared: Arc<SharedState>,
    defaults: SegmentDefaults,
}

impl PlaybackEngine {
    /// Spawn the engine task and return a handle to it
    pub fn spawn(graph: AudioGraph, config: EngineConfig) -> PlaybackHandle {
        let events = EventBus::new(config.event_capacity);
        let scheduler = SegmentScheduler::new(graph, events.clone(), config.initial_volume);
        let shared = Arc::new(SharedState::new(events, scheduler.status()));
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);

        let engine = PlaybackEngine {
            scheduler,
            commands: rx,
            shared: Arc::clone(&shared),
            defaults: config.defaults,
        };
        let task = tokio::spawn(engine.run());

        PlaybackHandle {
            commands: tx,
            shared,
            task: Arc::new(parking_lot::Mutex::new(Some(task))),
        }
    }

    async fn run(mut self) {
        info!("Playback engine started");
        let mut shutdown_reply = None;

        loop {
            let deadline = self.scheduler.next_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        shutdown_reply = Some(reply);
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("Command channel closed");
                        break;
                    }
                },
                _ = sleep_until_opt(deadline) => {
                    self.scheduler.process_due().await;
                    self.publish().await;
                }
                ended = self.scheduler.source_ended() => {
                    if let Some(node) = ended {
                        self.scheduler.on_source_ended(node).await;
                    }
                    self.publish().await;
                }
            }
        }

        self.scheduler.stop();
        self.publish().await;
        self.scheduler.dispose();
        info!("Playback engine stopped");

        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    /// Apply one command; the status is published before the caller hears back
    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                journey,
                timer_minutes,
                reply,
            } => {
                let result = self
                    .scheduler
                    .start_journey(&journey, &self.defaults, timer_minutes)
                    .await;
                self.publish().await;
                let _ = reply.send(result);
            }
            Command::Pause { reply } => {
                let outcome = self.scheduler.pause();
                self.publish().await;
                let _ = reply.send(outcome);
            }
            Command::Resume { reply } => {
                let outcome = self.scheduler.resume().await;
                self.publish().await;
                let _ = reply.send(outcome);
            }
            Command::Stop { reply } => {
                let outcome = self.scheduler.stop();
                self.publish().await;
                let _ = reply.send(outcome);
            }
            Command::SetVolume { percent, reply } => {
                self.scheduler.set_volume(percent);
                self.publish().await;
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                // run() intercepts shutdown before dispatch
                let _ = reply.send(());
            }
        }
    }

    async fn publish(&self) {
        self.shared.set_status(self.scheduler.status()).await;
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running engine
#[derive(Clone)]
pub struct PlaybackHandle {
    commands: mpsc::Sender<Command>,
    shared: Arc<SharedState>,
    task: Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>,
}

impl PlaybackHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| Error::EngineClosed)?;
        rx.await.map_err(|_| Error::EngineClosed)
    }

    /// Start `journey` with a session timer of `timer_minutes`
    pub async fn start(&self, journey: Journey, timer_minutes: f64) -> Result<()> {
        self.request(|reply| Command::Start {
            journey: Box::new(journey),
            timer_minutes,
            reply,
        })
        .await?
    }

    pub async fn pause(&self) -> Result<CommandOutcome> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<CommandOutcome> {
        self.request(|reply| Command::Resume { reply }).await?
    }

    pub async fn stop(&self) -> Result<CommandOutcome> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Set master volume in percent (0-100)
    pub async fn set_volume(&self, percent: u8) -> Result<()> {
        self.request(|reply| Command::SetVolume { percent, reply })
            .await
    }

    /// Latest published status; never waits on the engine task
    pub async fn status(&self) -> PlaybackStatus {
        self.shared.status().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NocturneEvent> {
        self.shared.subscribe_events()
    }

    /// Wait for the next `SessionCompleted` event.
    ///
    /// Returns the journey id and elapsed seconds of the completed session.
    pub async fn completed(&self) -> Result<(Option<i64>, u64)> {
        let mut rx = self.subscribe();
        loop {
            match rx.recv().await {
                Ok(NocturneEvent::SessionCompleted {
                    journey_id,
                    elapsed_secs,
                    ..
                }) => return Ok((journey_id, elapsed_secs)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Completion listener lagged by {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(Error::EngineClosed),
            }
        }
    }

    /// Stop the session, dispose the audio graph and wait for the task to end
    pub async fn shutdown(&self) -> Result<()> {
        let result = self.request(|reply| Command::Shutdown { reply }).await;
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        result
    }
}
