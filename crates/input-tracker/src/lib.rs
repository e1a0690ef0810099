//! ExamWatch Input Tracker
//!
//! Records key transitions and mouse clicks to a durable CSV event log,
//! independently of the video path. OS-level hooks push notifications
//! through a channel to a single writer task that owns the log file:
//!
//! - **Evdev:** direct device access on Linux (requires `input` group)
//! - **Null:** other platforms, log stays header-only
//!
//! Every event is appended and synced as soon as it is received.

pub mod hooks;
pub mod sink;

pub use hooks::{detect_platform_hook, EventSender, InputHook, RawNotification, ScriptedHook};
pub use sink::EventLogSink;

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use examwatch_common::error::{ExamwatchError, ExamwatchResult};
use examwatch_common::lifecycle::{LifecycleState, StopToken};
use examwatch_model::event::InputEvent;

/// Background capture of keyboard and mouse-click events into an [`EventLogSink`].
pub struct InputEventCapturer {
    log_path: PathBuf,
    keepalive: Duration,
    hook: Box<dyn InputHook>,
    state: LifecycleState,
    stop: StopToken,
    writer: Option<JoinHandle<u64>>,
}

impl InputEventCapturer {
    pub fn new(log_path: impl Into<PathBuf>, keepalive: Duration, hook: Box<dyn InputHook>) -> Self {
        Self {
            log_path: log_path.into(),
            keepalive,
            hook,
            state: LifecycleState::Idle,
            stop: StopToken::new(),
            writer: None,
        }
    }

    /// Open the log, register the hook and spawn the writer task.
    ///
    /// Must be called from within a tokio runtime. A failure leaves the
    /// capturer `Stopped`; nothing outside this component is affected.
    pub fn start(&mut self) -> ExamwatchResult<()> {
        if self.state != LifecycleState::Idle {
            return Err(ExamwatchError::input_tracking(format!(
                "Input capturer cannot start from state {:?}",
                self.state
            )));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ExamwatchError::input_tracking(format!("Input capturer needs a tokio runtime: {e}"))
        })?;

        let mut sink = match EventLogSink::open(&self.log_path) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::error!(path = %self.log_path.display(), error = %e, "Event log unavailable; input capture disabled");
                self.stop.stop();
                self.state = LifecycleState::Stopped;
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = self.hook.register(EventSender::new(tx)) {
            tracing::error!(hook = self.hook.name(), error = %e, "Failed to register input hook");
            sink.close();
            self.stop.stop();
            self.state = LifecycleState::Stopped;
            return Err(e);
        }

        self.writer = Some(runtime.spawn(write_events(
            sink,
            rx,
            self.stop.clone(),
            self.keepalive,
        )));
        self.state = LifecycleState::Running;

        tracing::info!(
            hook = self.hook.name(),
            path = %self.log_path.display(),
            "Input capture started"
        );
        Ok(())
    }

    /// Unregister the hook, then wait for the writer to drain and close the log.
    ///
    /// Returns the number of events logged, or `None` if there was nothing to
    /// stop (never started, failed to start, or already stopped).
    pub async fn stop(&mut self) -> Option<u64> {
        if !self.state.is_active() {
            return None;
        }
        self.state = LifecycleState::Stopping;

        self.hook.unregister();
        self.stop.stop();

        let events = match self.writer.take() {
            Some(writer) => match writer.await {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(error = %e, "Event writer task failed");
                    0
                }
            },
            None => 0,
        };

        self.state = LifecycleState::Stopped;
        tracing::info!(events, "Input capture stopped");
        Some(events)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }
}

impl Drop for InputEventCapturer {
    fn drop(&mut self) {
        // The detached writer exits once the hook drops its sender.
        self.hook.unregister();
        self.stop.stop();
    }
}

/// Writer context: append each event as it arrives; check the stop token on
/// every keep-alive tick.
async fn write_events(
    mut sink: EventLogSink,
    mut rx: UnboundedReceiver<InputEvent>,
    stop: StopToken,
    keepalive: Duration,
) -> u64 {
    let mut tick = tokio::time::interval(keepalive);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            event = rx.recv() => match event {
                Some(event) => append(&mut sink, &event),
                None => break,
            },
            _ = tick.tick() => {
                if stop.is_stopped() {
                    break;
                }
            }
        }
    }

    // Anything already delivered by the OS still goes to disk.
    rx.close();
    while let Ok(event) = rx.try_recv() {
        append(&mut sink, &event);
    }

    sink.close();
    sink.events_written()
}

fn append(sink: &mut EventLogSink, event: &InputEvent) {
    if let Err(e) = sink.append(event) {
        tracing::warn!(error = %e, "Failed to append input event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::Ordering;

    fn key(label: &str, pressed: bool) -> RawNotification {
        RawNotification::Key {
            label: label.to_string(),
            pressed,
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn events_are_logged_in_delivery_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("behavioral_log.csv");
        let hook = ScriptedHook::new(vec![
            key("a", true),
            RawNotification::Motion { x: 3, y: 4 },
            RawNotification::Button {
                button: "left".to_string(),
                pressed: true,
                x: 10,
                y: 20,
            },
        ]);

        let mut capturer = InputEventCapturer::new(&path, Duration::from_millis(20), Box::new(hook));
        capturer.start().unwrap();
        assert_eq!(capturer.state(), LifecycleState::Running);

        assert_eq!(capturer.stop().await, Some(2));

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains(",key_press,a,,,"));
        assert!(lines[2].ends_with(",mouse_down,click,10,20,left"));
    }

    #[tokio::test]
    async fn stop_twice_releases_hook_once() {
        let dir = tempfile::tempdir().unwrap();
        let hook = ScriptedHook::empty();
        let releases = hook.release_counter();

        let mut capturer = InputEventCapturer::new(
            dir.path().join("log.csv"),
            Duration::from_millis(20),
            Box::new(hook),
        );
        capturer.start().unwrap();

        assert_eq!(capturer.stop().await, Some(0));
        assert_eq!(capturer.stop().await, None);
        assert_eq!(capturer.state(), LifecycleState::Stopped);

        drop(capturer);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut capturer = InputEventCapturer::new(
            dir.path().join("log.csv"),
            Duration::from_millis(20),
            Box::new(ScriptedHook::empty()),
        );
        assert_eq!(capturer.stop().await, None);
        assert_eq!(capturer.state(), LifecycleState::Idle);
        assert!(!dir.path().join("log.csv").exists());
    }

    #[tokio::test]
    async fn unopenable_log_stops_only_the_capturer() {
        let dir = tempfile::tempdir().unwrap();
        let hook = ScriptedHook::new(vec![key("a", true)]);
        let releases = hook.release_counter();

        // A directory cannot be opened as the log file.
        let mut capturer = InputEventCapturer::new(dir.path(), Duration::from_millis(20), Box::new(hook));
        let err = capturer.start().unwrap_err();

        assert!(matches!(err, ExamwatchError::EventLog { .. }));
        assert_eq!(capturer.state(), LifecycleState::Stopped);
        assert!(capturer.start().is_err());
        assert_eq!(capturer.stop().await, None);
        assert_eq!(releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn writer_notices_stop_on_keepalive_tick() {
        let dir = tempfile::tempdir().unwrap();
        let sink = EventLogSink::open(dir.path().join("log.csv")).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = StopToken::new();

        let writer = tokio::spawn(write_events(sink, rx, stop.clone(), Duration::from_millis(10)));
        tx.send(InputEvent::key(chrono::Local::now(), "x", true))
            .unwrap();
        stop.stop();

        // The sender is still alive, so only the tick can end the task.
        let events = tokio::time::timeout(Duration::from_secs(2), writer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(events, 1);
        drop(tx);
    }
}
