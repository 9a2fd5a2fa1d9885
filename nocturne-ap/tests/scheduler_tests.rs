//! SegmentScheduler integration tests
//!
//! All tests run on paused tokio time. The headless audio clock follows tokio
//! time, so wall-clock timers and gain automation share one timeline.

mod helpers;

use helpers::{
    approx, drain, gain_now, run_for, scheduler, segment_a, segment_b, started_sources,
    FlakyBackend, SyntheticLoader,
};
use nocturne_ap::audio::AudioGraph;
use nocturne_ap::playback::SegmentScheduler;
use nocturne_common::events::EventBus;
use nocturne_ap::playback::{CommandOutcome, SegmentDefaults, SegmentDescriptor};
use nocturne_ap::Error;
use nocturne_common::events::{NocturneEvent, PlaybackState};
use nocturne_common::Journey;
use std::sync::Arc;
use std::time::Duration;

fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value)
}

/// A (5s, fade-out 1s) then B (3s audio, fade-in 2s, natural end), timer 30 min
#[tokio::test(start_paused = true)]
async fn test_two_segment_trace() {
    let loader = Arc::new(SyntheticLoader::new(20.0).with_duration("b.mp3", 3.0));
    let (mut sched, mut rx) = scheduler(Arc::clone(&loader));

    // t = 0: A audible at its gain, fade-out queued for t = 4
    sched
        .start(Some(7), vec![segment_a(), segment_b()], 30.0)
        .await
        .unwrap();
    assert_eq!(sched.state(), PlaybackState::Playing);
    assert_eq!(sched.status().segment_index, 0);
    assert!(approx(gain_now(&sched).unwrap(), 0.5));

    // t = 4: fade-out begins from full gain
    run_for(&mut sched, secs(4.0)).await;
    assert_eq!(sched.status().segment_index, 0);
    assert!(approx(gain_now(&sched).unwrap(), 0.5));
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, NocturneEvent::SegmentFadeOut { segment_index: 0, .. })));

    // t = 4.5: halfway down
    run_for(&mut sched, secs(0.5)).await;
    assert!(approx(gain_now(&sched).unwrap(), 0.25));

    // t = 5: B starts silent and fades in over 2s
    run_for(&mut sched, secs(0.5)).await;
    let status = sched.status();
    assert_eq!(status.segment_index, 1);
    assert_eq!(status.segment.as_ref().unwrap().source_id, "b.mp3");
    assert!(approx(gain_now(&sched).unwrap(), 0.0));

    run_for(&mut sched, secs(1.0)).await;
    assert!(approx(gain_now(&sched).unwrap(), 0.4));

    // t = 8: B's audio ends and the session wraps back to A
    run_for(&mut sched, secs(2.5)).await;
    let status = sched.status();
    assert_eq!(status.segment_index, 0);
    assert_eq!(status.state, PlaybackState::Playing);
    assert!(approx(gain_now(&sched).unwrap(), 0.5));

    let mut rx_all = drain(&mut rx);
    rx_all.retain(|e| matches!(e, NocturneEvent::SegmentStarted { .. }));
    assert_eq!(started_sources(&rx_all), vec!["b.mp3", "a.mp3"]);

    // Both sources decoded exactly once across the wrap
    assert_eq!(loader.calls_for("a.mp3"), 1);
    assert_eq!(loader.calls_for("b.mp3"), 1);
    assert_eq!(sched.status().elapsed_secs, 8);
}

/// A (5s, fade-out 1s, gain 0.5) then B (3s fixed, no fades, gain 0.8)
#[tokio::test(start_paused = true)]
async fn test_fixed_duration_trace_wraps_at_eight_seconds() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, mut rx) = scheduler(Arc::clone(&loader));
    let b = SegmentDescriptor::new("b.mp3", 0.8).with_duration(3.0);

    sched
        .start(None, vec![segment_a(), b], 30.0)
        .await
        .unwrap();
    assert!(approx(gain_now(&sched).unwrap(), 0.5));

    run_for(&mut sched, secs(4.5)).await;
    assert_eq!(sched.status().segment_index, 0);
    assert!(approx(gain_now(&sched).unwrap(), 0.25));

    // t = 5: B at full gain straight away
    run_for(&mut sched, secs(0.5)).await;
    assert_eq!(sched.status().segment_index, 1);
    assert!(approx(gain_now(&sched).unwrap(), 0.8));

    run_for(&mut sched, secs(2.5)).await;
    assert_eq!(sched.status().segment_index, 1);
    assert!(approx(gain_now(&sched).unwrap(), 0.8));

    // t = 8: zero fade-out, so fade and advance land on the same instant
    run_for(&mut sched, secs(0.5)).await;
    let status = sched.status();
    assert_eq!(status.segment_index, 0);
    assert_eq!(status.elapsed_secs, 8);
    assert!(approx(gain_now(&sched).unwrap(), 0.5));

    let events = drain(&mut rx);
    assert_eq!(started_sources(&events), vec!["a.mp3", "b.mp3", "a.mp3"]);
    assert!(events
        .iter()
        .any(|e| matches!(e, NocturneEvent::SegmentFadeOut { segment_index: 1, .. })));
}

#[tokio::test(start_paused = true)]
async fn test_zero_duration_segment_rejected() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, mut rx) = scheduler(Arc::clone(&loader));
    let empty = SegmentDescriptor::new("b.mp3", 0.8).with_duration(0.0);

    let err = sched
        .start(None, vec![segment_a(), empty], 30.0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidJourney(_)));
    assert_eq!(sched.state(), PlaybackState::Idle);
    assert_eq!(loader.calls(), 0);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, NocturneEvent::PlaybackFailed { .. })));
}

/// Fade-out longer than the duration: fade starts at once and the advance
/// follows after the full fade
#[tokio::test(start_paused = true)]
async fn test_fade_longer_than_duration_keeps_advancing() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, mut rx) = scheduler(loader);
    let short = |id: &str| {
        SegmentDescriptor::new(id, 0.6)
            .with_fades(0.0, 1.0)
            .with_duration(0.25)
    };

    sched
        .start(None, vec![short("a.mp3"), short("b.mp3")], 30.0)
        .await
        .unwrap();

    run_for(&mut sched, secs(3.5)).await;

    let events = drain(&mut rx);
    assert_eq!(
        started_sources(&events),
        vec!["a.mp3", "b.mp3", "a.mp3", "b.mp3"]
    );
    assert_eq!(sched.status().segment_index, 1);
}

#[tokio::test(start_paused = true)]
async fn test_countdown_completes_session() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, mut rx) = scheduler(loader);

    // 0.05 minutes rounds up to 3 seconds
    sched.start(None, vec![segment_a()], 0.05).await.unwrap();
    assert_eq!(sched.status().remaining_secs, 3);

    run_for(&mut sched, secs(3.0)).await;
    let status = sched.status();
    assert_eq!(status.state, PlaybackState::Completed);
    assert_eq!(status.elapsed_secs, 3);
    assert_eq!(status.remaining_secs, 0);

    // Segment A's 1s fade-out plays out, then the source is released
    assert!(sched.graph().active_node().is_some());
    run_for(&mut sched, secs(1.5)).await;
    assert!(sched.graph().active_node().is_none());
    assert_eq!(sched.pending_events(), 0);

    let events = drain(&mut rx);
    let progress: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            NocturneEvent::PlaybackProgress { remaining_secs, .. } => Some(*remaining_secs),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![2, 1, 0]);
    assert!(events.iter().any(|e| matches!(
        e,
        NocturneEvent::SessionCompleted {
            elapsed_secs: 3,
            ..
        }
    )));

    // Completion is terminal until a new start
    run_for(&mut sched, secs(10.0)).await;
    assert_eq!(sched.status().elapsed_secs, 3);
}

#[tokio::test(start_paused = true)]
async fn test_completion_without_fade_stops_immediately() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, _rx) = scheduler(loader);

    let segment = SegmentDescriptor::new("hum.mp3", 0.5).looping(true);
    sched.start(None, vec![segment], 1.0 / 60.0).await.unwrap();

    run_for(&mut sched, secs(1.0)).await;
    assert_eq!(sched.state(), PlaybackState::Completed);
    assert!(sched.graph().active_node().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_pause_cancels_timers_and_freezes_countdown() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, mut rx) = scheduler(loader);
    sched
        .start(None, vec![segment_a(), segment_b()], 30.0)
        .await
        .unwrap();

    run_for(&mut sched, secs(2.0)).await;
    assert_eq!(sched.pause(), CommandOutcome::Applied);
    assert_eq!(sched.state(), PlaybackState::Paused);
    assert_eq!(sched.pending_events(), 0);
    assert!(sched.graph().active_node().is_none());

    let before = sched.status();
    drain(&mut rx);

    // A's fade-out (t = 4) and advance (t = 5) must not fire while paused
    run_for(&mut sched, secs(5.0)).await;
    let after = sched.status();
    assert_eq!(after.elapsed_secs, before.elapsed_secs);
    assert_eq!(after.remaining_secs, before.remaining_secs);
    assert_eq!(after.segment_index, 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resume_replays_current_segment() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, mut rx) = scheduler(Arc::clone(&loader));
    sched
        .start(None, vec![segment_a(), segment_b()], 30.0)
        .await
        .unwrap();

    run_for(&mut sched, secs(3.0)).await;
    sched.pause();
    run_for(&mut sched, secs(60.0)).await;
    drain(&mut rx);

    assert_eq!(sched.resume().await.unwrap(), CommandOutcome::Applied);
    assert_eq!(sched.state(), PlaybackState::Playing);
    assert_eq!(started_sources(&drain(&mut rx)), vec!["a.mp3"]);

    // Full 5s segment again: still on A after 3.5s, B after 5s
    run_for(&mut sched, secs(3.5)).await;
    assert_eq!(sched.status().segment_index, 0);
    run_for(&mut sched, secs(1.5)).await;
    assert_eq!(sched.status().segment_index, 1);

    assert_eq!(sched.status().elapsed_secs, 8);
    assert_eq!(loader.calls_for("a.mp3"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_resets_session() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, _rx) = scheduler(loader);
    sched
        .start(Some(3), vec![segment_a(), segment_b()], 30.0)
        .await
        .unwrap();
    run_for(&mut sched, secs(6.0)).await;
    assert_eq!(sched.status().segment_index, 1);

    assert_eq!(sched.stop(), CommandOutcome::Applied);
    let status = sched.status();
    assert_eq!(status.state, PlaybackState::Idle);
    assert_eq!(status.segment_index, 0);
    assert_eq!(status.elapsed_secs, 0);
    assert_eq!(status.remaining_secs, 0);
    assert_eq!(status.segment_count, 0);
    assert!(status.segment.is_none());
    assert!(status.journey_id.is_none());
    assert_eq!(sched.pending_events(), 0);
    assert!(sched.graph().active_node().is_none());

    // Stop from Idle is still fine
    assert_eq!(sched.stop(), CommandOutcome::Applied);
}

#[tokio::test(start_paused = true)]
async fn test_out_of_state_commands_are_ignored() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, _rx) = scheduler(loader);

    assert_eq!(sched.pause(), CommandOutcome::Ignored);
    assert_eq!(sched.resume().await.unwrap(), CommandOutcome::Ignored);
    assert_eq!(sched.state(), PlaybackState::Idle);

    sched.start(None, vec![segment_a()], 30.0).await.unwrap();
    assert_eq!(sched.resume().await.unwrap(), CommandOutcome::Ignored);

    sched.pause();
    assert_eq!(sched.pause(), CommandOutcome::Ignored);
    assert_eq!(sched.state(), PlaybackState::Paused);
}

#[tokio::test(start_paused = true)]
async fn test_start_load_failure_leaves_idle() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    loader.fail("a.mp3");
    let (mut sched, mut rx) = scheduler(loader);

    let err = sched
        .start(Some(9), vec![segment_a(), segment_b()], 30.0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AudioLoad { .. }));

    let status = sched.status();
    assert_eq!(status.state, PlaybackState::Idle);
    assert!(status.last_error.unwrap().contains("a.mp3"));
    assert_eq!(sched.pending_events(), 0);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, NocturneEvent::PlaybackFailed { .. })));

    // Nothing fires later
    run_for(&mut sched, secs(10.0)).await;
    assert_eq!(sched.status().elapsed_secs, 0);
}

#[tokio::test(start_paused = true)]
async fn test_auto_advance_failure_aborts_session() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    loader.fail("b.mp3");
    let (mut sched, mut rx) = scheduler(loader);
    sched
        .start(None, vec![segment_a(), segment_b()], 30.0)
        .await
        .unwrap();

    run_for(&mut sched, secs(5.5)).await;
    let status = sched.status();
    assert_eq!(status.state, PlaybackState::Idle);
    assert!(status.last_error.unwrap().contains("b.mp3"));
    assert!(sched.graph().active_node().is_none());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        NocturneEvent::PlaybackStateChanged {
            old_state: PlaybackState::Playing,
            new_state: PlaybackState::Idle,
            ..
        }
    )));

    // A fresh start clears the error
    let (mut sched, _rx) = scheduler(Arc::new(SyntheticLoader::new(20.0)));
    sched.start(None, vec![segment_a()], 30.0).await.unwrap();
    assert!(sched.status().last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_start_arguments() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, _rx) = scheduler(loader);

    let err = sched.start(None, Vec::new(), 30.0).await.unwrap_err();
    assert!(matches!(err, Error::InvalidJourney(_)));

    let err = sched.start(None, vec![segment_a()], 0.0).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTimer(_)));
    assert_eq!(sched.state(), PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_restart_replaces_running_session() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, _rx) = scheduler(loader);
    sched
        .start(Some(1), vec![segment_a(), segment_b()], 30.0)
        .await
        .unwrap();
    run_for(&mut sched, secs(6.0)).await;
    let old_node = sched.graph().active_node();

    sched
        .start(Some(2), vec![segment_b()], 10.0)
        .await
        .unwrap();
    let status = sched.status();
    assert_eq!(status.journey_id, Some(2));
    assert_eq!(status.segment_index, 0);
    assert_eq!(status.elapsed_secs, 0);
    assert_eq!(status.remaining_secs, 600);
    assert_ne!(sched.graph().active_node(), old_node);

    // Only the new session's tick is pending
    assert_eq!(sched.pending_events(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_looping_segment_holds_until_timer() {
    let loader = Arc::new(SyntheticLoader::new(2.0));
    let (mut sched, mut rx) = scheduler(loader);
    let ambience = SegmentDescriptor::new("rain.mp3", 0.4).looping(true);
    sched
        .start(None, vec![ambience, segment_a()], 30.0)
        .await
        .unwrap();

    run_for(&mut sched, secs(20.0)).await;
    assert_eq!(sched.status().segment_index, 0);
    assert_eq!(started_sources(&drain(&mut rx)), vec!["rain.mp3"]);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_duration_overrides_audio_length() {
    // 2s of audio in a 5s segment: the segment still lasts 5s
    let loader = Arc::new(SyntheticLoader::new(2.0));
    let (mut sched, _rx) = scheduler(loader);
    sched
        .start(None, vec![segment_a(), segment_b()], 30.0)
        .await
        .unwrap();

    run_for(&mut sched, secs(4.5)).await;
    assert_eq!(sched.status().segment_index, 0);
    run_for(&mut sched, secs(0.5)).await;
    assert_eq!(sched.status().segment_index, 1);
}

#[tokio::test(start_paused = true)]
async fn test_volume_is_normalized() {
    let loader = Arc::new(SyntheticLoader::new(2.0));
    let (mut sched, mut rx) = scheduler(loader);

    sched.set_volume(25);
    assert!(approx(sched.graph().master_volume(), 0.25));
    assert_eq!(sched.status().volume_percent, 25);

    sched.set_volume(250);
    assert_eq!(sched.graph().master_volume(), 1.0);
    assert_eq!(sched.status().volume_percent, 100);

    let volumes: Vec<f32> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            NocturneEvent::VolumeChanged { volume, .. } => Some(volume),
            _ => None,
        })
        .collect();
    assert_eq!(volumes.len(), 2);
    assert!(approx(volumes[1], 1.0));
}

#[tokio::test(start_paused = true)]
async fn test_start_journey_maps_catalog_record() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, _rx) = scheduler(Arc::clone(&loader));
    let journey = Journey::from_json(
        r#"{"id": 12, "title": "Tide", "duration_sec": 900, "segments": [
            {"id": 1, "order": 0, "type": "narration", "content": {"text": "Breathe."},
             "duration_sec": 4},
            {"id": 2, "order": 1, "type": "music",
             "content": {"audio_url": "tide.mp3", "gain": 0.3, "loop": true}}
        ]}"#,
    )
    .unwrap();

    sched
        .start_journey(&journey, &SegmentDefaults::default(), 15.0)
        .await
        .unwrap();
    let status = sched.status();
    assert_eq!(status.journey_id, Some(12));
    assert_eq!(status.segment_count, 2);
    assert_eq!(status.segment.unwrap().source_id, "silence.mp3");

    run_for(&mut sched, secs(4.0)).await;
    let status = sched.status();
    assert_eq!(status.segment_index, 1);
    assert!(approx(gain_now(&sched).unwrap(), 0.3));
    assert_eq!(loader.calls_for("silence.mp3"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_journey_rejected() {
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let (mut sched, _rx) = scheduler(loader);
    // Bypasses catalog validation, as a record built in code would
    let journey: Journey =
        serde_json::from_str(r#"{"id": 1, "title": "Empty", "duration_sec": 60, "segments": []}"#)
            .unwrap();

    let err = sched
        .start_journey(&journey, &SegmentDefaults::default(), 15.0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidJourney(_)));
    assert_eq!(sched.state(), PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_output_failure_aborts_session() {
    let backend = Arc::new(FlakyBackend::default());
    let loader = Arc::new(SyntheticLoader::new(20.0));
    let events = EventBus::new(256);
    let mut rx = events.subscribe();
    let graph = AudioGraph::new(Arc::clone(&backend) as _, loader);
    let mut sched = SegmentScheduler::new(graph, events, 100);

    sched
        .start(Some(3), vec![segment_a(), segment_b()], 30.0)
        .await
        .unwrap();
    run_for(&mut sched, secs(2.5)).await;
    assert_eq!(sched.status().elapsed_secs, 2);

    backend.fail("device unplugged");
    run_for(&mut sched, secs(1.0)).await;

    let status = sched.status();
    assert_eq!(status.state, PlaybackState::Idle);
    assert_eq!(status.elapsed_secs, 0);
    assert!(status.last_error.unwrap().contains("device unplugged"));
    assert!(sched.graph().active_node().is_none());
    assert_eq!(sched.pending_events(), 0);
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, NocturneEvent::PlaybackFailed { .. })));

    // The failed device refuses a new session
    let err = sched
        .start(Some(3), vec![segment_a()], 30.0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AudioOutput(_)));
}
