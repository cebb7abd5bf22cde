// SPDX-License-Identifier: GPL-3.0-only

//! Capture session state machine driven by a scripted camera and decoder

mod common;

use common::{CameraHandle, DecoderScript, RecordingListener, Step, wait_until};
use rand::Rng;
use scan::backends::camera::types::{FocusMode, PreviewRect, Resolution};
use scan::{CameraManager, CaptureOrchestrator, CaptureState, DisplayInfo, ScanConfig, ScanError};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(2);

struct Harness {
    camera: CameraHandle,
    script: DecoderScript,
    listener: Arc<RecordingListener>,
    scanner: CaptureOrchestrator,
}

fn harness_with(config: ScanConfig, focus_mode: FocusMode) -> Harness {
    let camera = CameraHandle::new(Resolution::new(200, 100));
    let script = DecoderScript::new();
    let listener = Arc::new(RecordingListener::default());
    let manager = CameraManager::new(
        Box::new(camera.device(focus_mode)),
        &config,
        DisplayInfo::default(),
    );
    let scanner = CaptureOrchestrator::new(manager, listener.clone(), script.factory(), config)
        .expect("orchestrator");
    Harness {
        camera,
        script,
        listener,
        scanner,
    }
}

fn harness() -> Harness {
    harness_with(ScanConfig::default(), FocusMode::ContinuousPicture)
}

#[test]
fn test_start_arms_exactly_one_frame() {
    let h = harness();
    assert_eq!(h.scanner.state(), CaptureState::Idle);

    h.scanner.start().unwrap();
    assert_eq!(h.scanner.state(), CaptureState::AwaitingFrame);
    assert_eq!(h.camera.opens(), 1);
    assert_eq!(h.camera.arms(), 1);
    assert!(h.camera.is_previewing());
    assert_eq!(h.listener.restarts(), 1);

    let config = h.scanner.camera().camera_config().unwrap();
    assert_eq!(config.resolution, Resolution::new(200, 100));
    assert!(config.preview_rect.is_some());
}

#[test]
fn test_start_while_running_is_a_no_op() {
    let h = harness();
    h.scanner.start().unwrap();
    let generation = h.scanner.generation();

    h.scanner.start().unwrap();
    assert_eq!(h.scanner.generation(), generation);
    assert_eq!(h.camera.opens(), 1);
    assert_eq!(h.camera.arms(), 1);
}

#[test]
fn test_open_failure_is_device_unavailable() {
    let h = harness();
    h.camera.fail_open();

    let err = h.scanner.start().unwrap_err();
    assert!(matches!(err, ScanError::DeviceUnavailable(_)));
    assert!(err.is_terminal());
    assert!(!h.scanner.state().is_running());
    assert_eq!(h.camera.arms(), 0);
    assert!(!h.scanner.restart());
    assert_eq!(h.script.stats().constructed, 0);
}

#[test]
fn test_decode_failure_rearms_once() {
    let h = harness();
    h.script.push(Step::Panic);
    h.scanner.start().unwrap();

    assert!(h.camera.deliver());
    assert!(wait_until(TIMEOUT, || h.camera.arms() == 2));
    assert_eq!(h.scanner.state(), CaptureState::AwaitingFrame);

    // Nothing else happens until the next frame arrives
    thread::sleep(Duration::from_millis(50));
    let stats = h.script.stats();
    assert_eq!(stats.decodes, 1);
    assert_eq!(stats.resets, 1);
    assert_eq!(h.camera.arms(), 2);
    assert_eq!(h.camera.pending(), 1);
    assert_eq!(h.listener.count(), 0);
}

#[test]
fn test_memory_exhaustion_keeps_scanning() {
    let h = harness();
    h.script.push(Step::Exhaust);
    h.script.push(Step::Text("recovered".into()));
    h.scanner.start().unwrap();

    assert!(h.camera.deliver());
    assert!(wait_until(TIMEOUT, || h.camera.arms() == 2));
    assert_eq!(h.script.stats().releases, 1);

    assert!(h.camera.deliver());
    assert!(wait_until(TIMEOUT, || h.listener.count() == 1));
    assert_eq!(h.listener.texts(), vec!["recovered"]);
}

#[test]
fn test_scan_window_past_frame_edge_rearms() {
    let h = harness();
    h.scanner.start().unwrap();
    h.scanner
        .set_scan_window(PreviewRect::new(u32::MAX - 5, 0, 10, 10), Resolution::new(200, 100));

    assert!(h.camera.deliver());
    assert!(wait_until(TIMEOUT, || h.camera.arms() == 2));
    assert_eq!(h.scanner.state(), CaptureState::AwaitingFrame);
    let stats = h.script.stats();
    assert_eq!(stats.decodes, 0);
    assert_eq!(stats.resets, 1);
}

#[test]
fn test_refused_first_frame_request_fails_start() {
    let h = harness();
    let camera = h.scanner.camera();
    camera.open().unwrap();
    camera.start_preview().unwrap();
    assert!(camera.request_preview_frame(|_| {}));

    let err = h.scanner.start().unwrap_err();
    assert!(matches!(err, ScanError::DeviceUnavailable(_)));
    assert_eq!(h.scanner.state(), CaptureState::Stopped);
    assert!(!h.camera.is_previewing());
    assert_eq!(h.camera.closes(), 1);
    assert_eq!(h.listener.restarts(), 0);
}

#[test]
fn test_refused_rearm_stops_scan() {
    let h = harness();
    h.scanner.start().unwrap();
    h.scanner.camera().stop_preview();

    // The callback armed before the preview stopped still fires
    assert!(h.camera.deliver());
    assert!(wait_until(TIMEOUT, || h.scanner.state() == CaptureState::Stopped));
    assert_eq!(h.script.stats().resets, 1);
    assert_eq!(h.camera.arms(), 1);
    assert_eq!(h.camera.closes(), 1);

    // A later start opens a fresh session
    h.scanner.start().unwrap();
    assert_eq!(h.scanner.state(), CaptureState::AwaitingFrame);
}

#[test]
fn test_success_notifies_once_and_holds_until_restart() {
    let h = harness();
    h.script.push(Step::Text("ABC123".into()));
    h.scanner.start().unwrap();

    assert!(h.camera.deliver());
    assert!(wait_until(TIMEOUT, || h.listener.count() == 1));
    assert_eq!(h.scanner.state(), CaptureState::Success);
    assert_eq!(h.listener.texts(), vec!["ABC123"]);

    let result = h.scanner.last_result().unwrap();
    assert_eq!(result.text, "ABC123");
    let thumbnail = result.thumbnail.expect("thumbnail");
    assert!(!thumbnail.jpeg.is_empty());
    assert!(result.scale_factor > 0.0);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(h.camera.arms(), 1);
    assert!(!h.camera.deliver());
    assert_eq!(h.listener.count(), 1);

    assert!(h.scanner.restart());
    assert_eq!(h.scanner.state(), CaptureState::AwaitingFrame);
    assert_eq!(h.camera.arms(), 2);
    assert!(h.scanner.last_result().is_none());
    assert_eq!(h.listener.restarts(), 2);
}

#[test]
fn test_restart_ignored_unless_success() {
    let h = harness();
    assert!(!h.scanner.restart());

    h.scanner.start().unwrap();
    assert!(!h.scanner.restart());
    assert_eq!(h.camera.arms(), 1);
}

#[test]
fn test_stop_discards_in_flight_result() {
    let mut config = ScanConfig::default();
    config.worker_join_timeout_ms = 2000;
    let h = harness_with(config, FocusMode::ContinuousPicture);

    let (release, gate) = mpsc::channel();
    h.script.push(Step::Gate(gate, "LATE".into()));
    h.scanner.start().unwrap();
    assert!(h.camera.deliver());
    assert!(wait_until(TIMEOUT, || h.script.stats().decodes == 1));
    assert_eq!(h.scanner.state(), CaptureState::Decoding);

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let _ = release.send(());
    });
    h.scanner.stop();
    releaser.join().unwrap();

    assert_eq!(h.scanner.state(), CaptureState::Stopped);
    assert_eq!(h.script.stats().resets, 1);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(h.listener.count(), 0);
    assert!(h.scanner.last_result().is_none());
    assert_eq!(h.camera.closes(), 1);
}

#[test]
fn test_stop_is_bounded_with_hung_worker() {
    let mut config = ScanConfig::default();
    config.worker_join_timeout_ms = 100;
    let h = harness_with(config, FocusMode::ContinuousPicture);

    let (release, gate) = mpsc::channel::<()>();
    h.script.push(Step::Gate(gate, "LATE".into()));
    h.scanner.start().unwrap();
    assert!(h.camera.deliver());
    assert!(wait_until(TIMEOUT, || h.script.stats().decodes == 1));

    let started = Instant::now();
    h.scanner.stop();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(h.scanner.state(), CaptureState::Stopped);
    assert!(!h.camera.is_previewing());
    assert_eq!(h.camera.closes(), 1);

    // The abandoned worker eventually finishes; its result goes nowhere
    drop(release);
    assert!(wait_until(TIMEOUT, || h.script.stats().resets == 1));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(h.listener.count(), 0);
}

#[test]
fn test_frame_from_previous_session_is_dropped() {
    let h = harness();
    h.scanner.start().unwrap();
    h.scanner.stop();
    h.scanner.start().unwrap();

    // One callback left over from the first session, one fresh arm
    assert_eq!(h.camera.pending(), 2);
    assert!(h.camera.deliver());
    thread::sleep(Duration::from_millis(50));
    assert_eq!(h.script.stats().decodes, 0);
    assert!(h.scanner.camera().is_frame_armed());

    assert!(h.camera.deliver());
    assert!(wait_until(TIMEOUT, || h.script.stats().decodes == 1));
    assert!(wait_until(TIMEOUT, || h.camera.arms() == 3));
}

#[test]
fn test_stop_from_every_state_reaches_stopped() {
    // Idle
    let h = harness();
    h.scanner.stop();
    assert_eq!(h.scanner.state(), CaptureState::Idle);

    // AwaitingFrame
    h.scanner.start().unwrap();
    h.scanner.stop();
    assert_eq!(h.scanner.state(), CaptureState::Stopped);

    // Success
    h.script.push(Step::Text("done".into()));
    h.scanner.start().unwrap();
    // The first session's callback is still queued on the device
    assert!(h.camera.deliver());
    assert!(h.camera.deliver());
    assert!(wait_until(TIMEOUT, || h.scanner.state() == CaptureState::Success));
    h.scanner.stop();
    assert_eq!(h.scanner.state(), CaptureState::Stopped);

    // Stopped again
    h.scanner.stop();
    assert_eq!(h.scanner.state(), CaptureState::Stopped);
    assert_eq!(h.camera.opens(), h.camera.closes());
}

#[test]
fn test_auto_focus_repeats_while_scanning() {
    let mut config = ScanConfig::default();
    config.auto_focus_interval_ms = 20;
    let h = harness_with(config, FocusMode::Auto);

    h.scanner.start().unwrap();
    assert!(wait_until(TIMEOUT, || h.camera.focus_calls() >= 3));

    h.scanner.stop();
    thread::sleep(Duration::from_millis(60));
    let after_stop = h.camera.focus_calls();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(h.camera.focus_calls(), after_stop);
}

#[test]
fn test_continuous_focus_is_not_triggered() {
    let mut config = ScanConfig::default();
    config.auto_focus_interval_ms = 20;
    let h = harness_with(config, FocusMode::ContinuousPicture);

    h.scanner.start().unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(h.camera.focus_calls(), 0);
}

#[test]
fn test_random_frame_arrivals_never_overlap() {
    let h = harness();
    h.scanner.start().unwrap();

    let mut rng = rand::rng();
    let mut delivered = 0;
    for i in 0..300 {
        match rng.random_range(0..10) {
            0..=4 => {
                if h.camera.deliver() {
                    delivered += 1;
                }
            }
            5 => {
                h.scanner.restart();
            }
            6 => h.script.push(Step::Text(format!("code-{}", i))),
            7 => h.script.push(if rng.random_bool(0.5) {
                Step::Exhaust
            } else {
                Step::NotFound
            }),
            _ => thread::sleep(Duration::from_micros(rng.random_range(0..500))),
        }
        assert!(h.camera.pending() <= 1);
    }

    h.scanner.stop();
    let stats = h.script.stats();
    assert_eq!(stats.max_active, 1.min(stats.decodes));
    assert!(stats.decodes <= delivered);
    assert_eq!(stats.resets, stats.decodes);
    assert_eq!(h.camera.max_pending(), 1);
    assert_eq!(h.scanner.state(), CaptureState::Stopped);
}
