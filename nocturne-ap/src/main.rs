//! Audio Player (nocturne-ap) - Main entry point
//!
//! Plays one sleep journey from a catalog JSON file until its session timer
//! runs out, logging transport events as they happen.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use nocturne_ap::audio::{AudioGraph, CpalBackend};
use nocturne_ap::config::{ConfigOverrides, PlayerConfig};
use nocturne_ap::PlaybackEngine;
use nocturne_common::config::TomlConfig;
use nocturne_common::human_time::{format_clock, format_seconds};
use nocturne_common::{Journey, NocturneEvent};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for nocturne-ap
#[derive(Parser, Debug)]
#[command(name = "nocturne-ap")]
#[command(about = "Segment playback engine for Nocturne sleep journeys")]
#[command(version)]
struct Args {
    /// Journey catalog record (JSON)
    #[arg(required_unless_present = "list_devices")]
    journey: Option<PathBuf>,

    /// Session timer in minutes
    #[arg(short, long)]
    timer_minutes: Option<f64>,

    /// Master volume (0-100)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: Option<u8>,

    /// Run without a sound device
    #[arg(long)]
    headless: bool,

    /// Output device name
    #[arg(short, long)]
    device: Option<String>,

    /// Bootstrap config file (default: NOCTURNE_CONFIG, then the platform
    /// config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root folder containing the audio directory (default:
    /// NOCTURNE_ROOT_FOLDER, then the config file)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Print available output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    let config = PlayerConfig::resolve(
        &toml_config,
        ConfigOverrides {
            root_folder: args.root_folder.clone(),
            headless: args.headless,
            volume: args.volume,
            timer_minutes: args.timer_minutes,
            device: args.device.clone(),
        },
    )
    .context("Invalid configuration")?;

    init_tracing(&config)?;

    if args.list_devices {
        for name in CpalBackend::list_devices().context("Failed to enumerate output devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let Some(journey_path) = args.journey else {
        bail!("no journey file given");
    };
    let journey = Journey::load(&journey_path)
        .with_context(|| format!("Failed to load journey {}", journey_path.display()))?;

    info!("Starting Nocturne Audio Player");
    info!("Root folder: {}", config.root_folder.display());
    info!(
        "Journey {} '{}': {} segments, timer {}",
        journey.id,
        journey.title,
        journey.segments.len(),
        format_seconds(config.timer_minutes * 60.0)
    );

    let graph = AudioGraph::new(
        config.build_backend(),
        config.build_loader().context("Failed to build audio loader")?,
    );
    let engine = PlaybackEngine::spawn(graph, config.engine_config());
    let mut events = engine.subscribe();

    engine
        .start(journey, config.timer_minutes)
        .await
        .context("Failed to start journey")?;

    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(NocturneEvent::SessionCompleted { elapsed_secs, .. }) => {
                    info!("Session complete after {}", format_clock(elapsed_secs));
                    break Ok(());
                }
                Ok(NocturneEvent::PlaybackFailed { message, .. }) => {
                    error!("Playback failed: {}", message);
                    break Err(anyhow::anyhow!(message));
                }
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event log lagged by {} events", skipped);
                }
                Err(RecvError::Closed) => {
                    break Err(anyhow::anyhow!("playback engine exited"));
                }
            },
            _ = shutdown_signal() => {
                engine.stop().await.context("Failed to stop playback")?;
                break Ok(());
            }
        }
    };

    // Let the closing fade finish before releasing the output
    if outcome.is_ok() {
        if let Some(segment) = engine.status().await.segment {
            tokio::time::sleep(Duration::from_secs_f64(segment.fade_out_secs.max(0.0))).await;
        }
    }

    engine.shutdown().await.context("Engine shutdown failed")?;
    info!("Shutdown complete");
    outcome
}

fn init_tracing(config: &PlayerConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_filter().into());

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn log_event(event: &NocturneEvent) {
    match event {
        NocturneEvent::PlaybackStateChanged {
            old_state,
            new_state,
            ..
        } => info!("{} -> {}", old_state, new_state),
        NocturneEvent::SegmentStarted {
            segment_index,
            source_id,
            ..
        } => info!("Segment {} playing '{}'", segment_index + 1, source_id),
        NocturneEvent::SegmentFadeOut {
            segment_index,
            fade_out_sec,
            ..
        } => debug!(
            "Segment {} fading out over {}",
            segment_index + 1,
            format_seconds(*fade_out_sec)
        ),
        NocturneEvent::PlaybackProgress {
            elapsed_secs,
            remaining_secs,
            ..
        } => {
            if elapsed_secs % 60 == 0 {
                info!(
                    "{} elapsed, {} remaining",
                    format_clock(*elapsed_secs),
                    format_clock(*remaining_secs)
                );
            }
        }
        other => debug!("Event: {}", other.name()),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping playback");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping playback");
        },
    }
}
