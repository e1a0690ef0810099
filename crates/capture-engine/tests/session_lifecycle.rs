//! End-to-end session lifecycle with fake devices and a scripted input hook.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use examwatch_capture_engine::testing::ScriptedSource;
use examwatch_capture_engine::{ClassifierLoader, FrameClassifier, MonitorSession};
use examwatch_common::config::AppConfig;
use examwatch_common::error::{ExamwatchError, ExamwatchResult};
use examwatch_common::lifecycle::LifecycleState;
use examwatch_input_tracker::{RawNotification, ScriptedHook};
use examwatch_model::detection::Detection;
use examwatch_model::frame::{Frame, FrameOrigin};

struct NoDetections;

impl FrameClassifier for NoDetections {
    fn classify(&mut self, _frame: &Frame) -> ExamwatchResult<Vec<Detection>> {
        Ok(Vec::new())
    }
}

/// Loader that records whether it was asked to load.
struct RecordingLoader {
    fail: bool,
    called: Arc<AtomicBool>,
}

impl ClassifierLoader for RecordingLoader {
    fn load(&self, model_path: &Path) -> ExamwatchResult<Box<dyn FrameClassifier>> {
        self.called.store(true, Ordering::SeqCst);
        if self.fail {
            return Err(ExamwatchError::FileNotFound {
                path: model_path.to_path_buf(),
            });
        }
        Ok(Box::new(NoDetections))
    }
}

fn config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.capture.target_fps = 100.0;
    config.event_log.path = dir.join("raw_behavioral").join("behavioral_log.csv");
    config.event_log.keepalive_ms = 20;
    config.detection.model_path = dir.join("missing.onnx");
    config
}

fn log_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_runs_both_paths_and_shuts_down_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let log_path = config.event_log.path.clone();

    let webcam = ScriptedSource::always(FrameOrigin::Webcam);
    let screen = ScriptedSource::always(FrameOrigin::ScreenRegion);
    let webcam_stats = webcam.stats();
    let screen_stats = screen.stats();

    let hook = ScriptedHook::new(vec![
        RawNotification::Key {
            label: "a".to_string(),
            pressed: true,
        },
        RawNotification::Button {
            button: "left".to_string(),
            pressed: true,
            x: 10,
            y: 20,
        },
    ]);
    let hook_releases = hook.release_counter();

    let mut session = MonitorSession::new(config)
        .with_input_hook(Box::new(hook))
        .with_sources(Box::new(webcam), Box::new(screen))
        .with_classifier_loader(Box::new(RecordingLoader {
            fail: false,
            called: Arc::default(),
        }));

    session.start().await.unwrap();
    assert_eq!(session.state(), LifecycleState::Running);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = session.shutdown().await.unwrap();
    assert_eq!(session.state(), LifecycleState::Stopped);
    assert!(report.loop_stats.delivered > 0);
    assert_eq!(report.loop_stats.delivered, report.loop_stats.cycles);
    assert_eq!(report.events_logged, Some(2));
    assert!(!report.started_at.is_empty());

    // Reentrant: nothing is released twice.
    assert!(session.shutdown().await.is_none());
    assert_eq!(webcam_stats.closes(), 1);
    assert_eq!(screen_stats.closes(), 1);
    assert_eq!(hook_releases.load(Ordering::SeqCst), 1);

    let lines = log_lines(&log_path);
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains(",key_press,a,"));
    assert!(lines[2].ends_with(",mouse_down,click,10,20,left"));
}

#[tokio::test]
async fn classifier_failure_aborts_before_any_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let log_path = config.event_log.path.clone();

    let webcam = ScriptedSource::always(FrameOrigin::Webcam);
    let webcam_calls = webcam.call_counter();
    let hook = ScriptedHook::empty();
    let hook_releases = hook.release_counter();
    let called = Arc::new(AtomicBool::new(false));

    let mut session = MonitorSession::new(config)
        .with_input_hook(Box::new(hook))
        .with_sources(
            Box::new(webcam),
            Box::new(ScriptedSource::always(FrameOrigin::ScreenRegion)),
        )
        .with_classifier_loader(Box::new(RecordingLoader {
            fail: true,
            called: called.clone(),
        }));

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, ExamwatchError::FileNotFound { .. }));
    assert!(called.load(Ordering::SeqCst));
    assert_eq!(session.state(), LifecycleState::Stopped);
    assert_eq!(webcam_calls.load(Ordering::SeqCst), 0);

    // Input capture had started first and was torn down again.
    assert_eq!(hook_releases.load(Ordering::SeqCst), 1);
    assert_eq!(log_lines(&log_path).len(), 1);

    assert!(session.shutdown().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unusable_event_log_leaves_capture_running() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    // A directory cannot be opened as the log file.
    config.event_log.path = dir.path().to_path_buf();

    let mut session = MonitorSession::new(config)
        .with_input_hook(Box::new(ScriptedHook::empty()))
        .with_sources(
            Box::new(ScriptedSource::always(FrameOrigin::Webcam)),
            Box::new(ScriptedSource::always(FrameOrigin::ScreenRegion)),
        )
        .with_classifier_loader(Box::new(RecordingLoader {
            fail: false,
            called: Arc::default(),
        }));

    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let report = session.shutdown().await.unwrap();
    assert!(report.loop_stats.delivered > 0);
    assert_eq!(report.events_logged, None);
}

#[tokio::test]
async fn shutdown_before_start_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = MonitorSession::new(config(dir.path()))
        .with_input_hook(Box::new(ScriptedHook::empty()))
        .with_sources(
            Box::new(ScriptedSource::never(FrameOrigin::Webcam)),
            Box::new(ScriptedSource::never(FrameOrigin::ScreenRegion)),
        );

    assert!(session.shutdown().await.is_none());
    assert_eq!(session.state(), LifecycleState::Idle);
}
