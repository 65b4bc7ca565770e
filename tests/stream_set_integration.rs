//! Integration tests for the stream set lifecycle
//!
//! These tests drive the full pipeline on a manual clock:
//! - Configure → start → render, checking the synthesized waveform end to end
//! - Reconfiguration and teardown of previous streams
//! - Stop semantics and zero-sample quanta
//! - Creation failures and configuration conflicts

use std::f64::consts::TAU;
use std::sync::Arc;

use quantum_synth::config::GraphConfig;
use quantum_synth::error::{AudioError, AudioErrorCodes, CreationTarget};
use quantum_synth::graph::{AudioGraph, GraphBackend, ManualClockBackend, QuantumOutcome};
use quantum_synth::managers::{StreamSetManager, StreamState};
use quantum_synth::notify::{NotificationHub, NotifyType};

fn manager() -> (StreamSetManager, Arc<NotificationHub>) {
    let hub = Arc::new(NotificationHub::new(32, 32));
    let manager = StreamSetManager::new(Box::new(ManualClockBackend), GraphConfig::default())
        .with_notification_sink(hub.clone());
    (manager, hub)
}

fn expected_sample(i: usize, sample_count: usize) -> f32 {
    (0.3 * (i as f64 * TAU / sample_count as f64).sin()) as f32
}

/// Configure(1, 2), start, one 480-sample quantum at 48 kHz
#[test]
fn test_single_stereo_stream_end_to_end() {
    let (manager, hub) = manager();
    manager.configure(1, 2).unwrap();
    manager.start_all().unwrap();

    let renderer = manager.renderer().unwrap();
    let mut out = vec![0.0f32; 960];
    let outcome = renderer.render(480, &mut out);
    assert_eq!(
        outcome,
        QuantumOutcome::Rendered {
            streams_serviced: 1,
            frames_mixed: 1
        }
    );

    for i in 0..480 {
        let expected = expected_sample(i, 480);
        assert!((out[2 * i] - expected).abs() < 1e-6, "left mismatch at {}", i);
        assert!((out[2 * i + 1] - expected).abs() < 1e-6, "right mismatch at {}", i);
    }
    assert!(out.iter().all(|s| s.abs() <= 0.3 + 1e-6));

    let stats = manager.stream_stats(0).unwrap();
    assert_eq!(stats.quanta_serviced, 1);
    assert_eq!(stats.frames_submitted, 1);
    assert_eq!(stats.frames_dropped, 0);

    assert!(hub
        .snapshot()
        .recent
        .iter()
        .any(|n| n.kind == NotifyType::Status));
}

#[test]
fn test_block_size_sets_period() {
    let (manager, _hub) = manager();
    manager.configure(1, 1).unwrap();
    manager.start_all().unwrap();
    let renderer = manager.renderer().unwrap();

    for &samples in &[64usize, 441, 1024] {
        let mut out = vec![0.0f32; samples * 2];
        renderer.render(samples, &mut out);
        assert!(out[0].abs() < 1e-6);
        assert!((out[2 * (samples / 4)] - expected_sample(samples / 4, samples)).abs() < 1e-6);
    }
}

#[test]
fn test_reconfigure_replaces_previous_streams() {
    let (manager, _hub) = manager();
    manager.configure(3, 2).unwrap();
    manager.start_all().unwrap();

    let old_renderer = manager.renderer().unwrap();
    let mut out = vec![0.0f32; 960];
    assert_eq!(
        old_renderer.render(480, &mut out),
        QuantumOutcome::Rendered {
            streams_serviced: 3,
            frames_mixed: 3
        }
    );
    // Three identical streams sum
    assert!((out[2 * 120] - 0.9).abs() < 1e-5);

    manager.stop_all().unwrap();
    manager.reconfigure(1).unwrap();
    assert_eq!(manager.stream_count(), 1);
    assert_eq!(manager.stream_states(), vec![StreamState::Stopped]);

    // The previous graph no longer renders anything
    assert_eq!(old_renderer.render(480, &mut out), QuantumOutcome::Idle);
    assert!(out.iter().all(|&s| s == 0.0));

    // The new stream starts from fresh counters
    let stats = manager.stream_stats(0).unwrap();
    assert_eq!(stats.quanta_serviced, 0);
    assert!(manager.stream_stats(1).is_none());

    manager.start_all().unwrap();
    let renderer = manager.renderer().unwrap();
    assert_eq!(
        renderer.render(480, &mut out),
        QuantumOutcome::Rendered {
            streams_serviced: 1,
            frames_mixed: 1
        }
    );
}

#[test]
fn test_stop_all_twice_and_stop_takes_effect_next_quantum() {
    let (manager, _hub) = manager();
    manager.configure(2, 2).unwrap();
    manager.start_all().unwrap();
    let renderer = manager.renderer().unwrap();

    let mut out = vec![0.0f32; 960];
    renderer.render(480, &mut out);
    let before = manager.stream_stats(0).unwrap();

    manager.stop_all().unwrap();
    manager.stop_all().unwrap();

    let outcome = renderer.render(480, &mut out);
    assert_eq!(
        outcome,
        QuantumOutcome::Rendered {
            streams_serviced: 0,
            frames_mixed: 0
        }
    );
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(manager.stream_stats(0).unwrap(), before);
    assert_eq!(manager.stream_states(), vec![StreamState::Stopped; 2]);
}

#[test]
fn test_zero_sample_quantum_submits_nothing() {
    let (manager, _hub) = manager();
    manager.configure(1, 2).unwrap();
    manager.start_all().unwrap();
    let renderer = manager.renderer().unwrap();

    let mut out = vec![0.5f32; 4];
    let outcome = renderer.render(0, &mut out);
    assert_eq!(
        outcome,
        QuantumOutcome::Rendered {
            streams_serviced: 1,
            frames_mixed: 0
        }
    );
    // Nothing outside the zero-length quantum is touched
    assert_eq!(out, vec![0.5; 4]);

    let stats = manager.stream_stats(0).unwrap();
    assert_eq!(stats.quanta_serviced, 1);
    assert_eq!(stats.frames_submitted, 0);
    assert_eq!(stats.frames_dropped, 0);
}

struct UnavailableBackend;

impl GraphBackend for UnavailableBackend {
    fn create_graph(&self, _settings: &GraphConfig) -> Result<AudioGraph, AudioError> {
        Err(AudioError::DeviceError {
            details: "audio service unavailable".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

#[test]
fn test_graph_creation_failure_reports_error() {
    let hub = Arc::new(NotificationHub::new(8, 8));
    let manager = StreamSetManager::new(Box::new(UnavailableBackend), GraphConfig::default())
        .with_notification_sink(hub.clone());

    match manager.configure(2, 2) {
        Err(AudioError::CreationFailed { target, reason }) => {
            assert_eq!(target, CreationTarget::Graph);
            assert!(reason.contains("audio service unavailable"));
        }
        other => panic!("expected CreationFailed, got {:?}", other),
    }

    assert!(!manager.is_configured());
    assert!(manager.renderer().is_none());
    let last = hub.last().unwrap();
    assert_eq!(last.kind, NotifyType::Error);
    assert_eq!(last.code, Some(AudioErrorCodes::CREATION_FAILED));
}

#[test]
fn test_channel_conflict_keeps_running_set() {
    let (manager, _hub) = manager();
    manager.configure(1, 2).unwrap();
    manager.start_all().unwrap();
    let renderer = manager.renderer().unwrap();

    assert!(matches!(
        manager.configure(1, 1),
        Err(AudioError::ConfigurationConflict {
            running_channels: 2,
            requested_channels: 1
        })
    ));

    let mut out = vec![0.0f32; 960];
    assert_eq!(
        renderer.render(480, &mut out),
        QuantumOutcome::Rendered {
            streams_serviced: 1,
            frames_mixed: 1
        }
    );
}

#[test]
fn test_drop_of_manager_stops_rendering() {
    let (manager, _hub) = manager();
    manager.configure(1, 2).unwrap();
    manager.start_all().unwrap();
    let renderer = manager.renderer().unwrap();

    drop(manager);

    let mut out = vec![1.0f32; 16];
    assert_eq!(renderer.render(8, &mut out), QuantumOutcome::Idle);
}
