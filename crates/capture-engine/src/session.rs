//! Monitoring session: supervises the input capturer and the capture loop.
//!
//! Startup order is input capture, classifier, capture loop. Shutdown is
//! always capture loop, input capture, device release, and may be invoked
//! any number of times.

use std::time::Duration;

use examwatch_common::clock::{FramePacer, SessionClock};
use examwatch_common::config::AppConfig;
use examwatch_common::error::{ExamwatchError, ExamwatchResult};
use examwatch_common::lifecycle::LifecycleState;
use examwatch_input_tracker::{detect_platform_hook, InputEventCapturer, InputHook};

use crate::classifier::{ClassifierLoader, DetectionConsumer, WeightsFileLoader};
use crate::paced::{CaptureLoopHandle, LoopStats, PacedCaptureLoop};
use crate::source::{FrameSource, RegionCaptureSource, WebcamSource};

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub loop_stats: LoopStats,
    /// `None` when input capture never started.
    pub events_logged: Option<u64>,
    pub duration: Duration,
    /// Wall-clock start time (RFC 3339).
    pub started_at: String,
}

impl SessionReport {
    pub fn effective_fps(&self) -> f64 {
        self.loop_stats.effective_fps(self.duration)
    }
}

struct Sources {
    webcam: Box<dyn FrameSource>,
    screen: Box<dyn FrameSource>,
}

/// Owns both capture paths for one monitoring run.
pub struct MonitorSession {
    config: AppConfig,
    state: LifecycleState,
    clock: Option<SessionClock>,
    hook: Option<Box<dyn InputHook>>,
    sources: Option<Sources>,
    loader: Box<dyn ClassifierLoader>,
    capturer: Option<InputEventCapturer>,
    capture_loop: Option<CaptureLoopHandle>,
}

impl MonitorSession {
    /// Create a session using the platform input hook and GStreamer devices.
    pub fn new(config: AppConfig) -> Self {
        let hook = detect_platform_hook(&config.input);
        let webcam = Box::new(WebcamSource::from_config(&config.capture));
        let screen = Box::new(RegionCaptureSource::from_config(&config.capture));
        Self {
            config,
            state: LifecycleState::Idle,
            clock: None,
            hook: Some(hook),
            sources: Some(Sources { webcam, screen }),
            loader: Box::new(WeightsFileLoader),
            capturer: None,
            capture_loop: None,
        }
    }

    pub fn with_input_hook(mut self, hook: Box<dyn InputHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_sources(mut self, webcam: Box<dyn FrameSource>, screen: Box<dyn FrameSource>) -> Self {
        self.sources = Some(Sources { webcam, screen });
        self
    }

    pub fn with_classifier_loader(mut self, loader: Box<dyn ClassifierLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Start input capture, load the classifier, then start the capture loop.
    ///
    /// An unusable event log only disables input capture. A classifier that
    /// fails to load stops everything already started and is returned as an
    /// error before any capture cycle runs.
    pub async fn start(&mut self) -> ExamwatchResult<()> {
        if self.state != LifecycleState::Idle {
            return Err(ExamwatchError::capture("Session already started"));
        }
        let pacer = FramePacer::from_rate(self.config.capture.target_fps)?;
        let (Some(hook), Some(sources)) = (self.hook.take(), self.sources.take()) else {
            return Err(ExamwatchError::capture("Session has no capture sources"));
        };

        tracing::info!(
            webcam_index = self.config.capture.webcam_index,
            region = ?self.config.capture.region,
            fps = self.config.capture.target_fps,
            "Starting monitoring session"
        );
        let clock = SessionClock::start();

        let mut capturer = InputEventCapturer::new(
            self.config.event_log.path.clone(),
            self.config.event_log.keepalive(),
            hook,
        );
        if let Err(e) = capturer.start() {
            tracing::error!(error = %e, "Input capture disabled for this session");
        }
        self.capturer = Some(capturer);

        let classifier = match self.loader.load(&self.config.detection.model_path) {
            Ok(classifier) => classifier,
            Err(e) => {
                tracing::error!(
                    model = %self.config.detection.model_path.display(),
                    error = %e,
                    "Failed to load frame classifier"
                );
                if let Some(capturer) = self.capturer.as_mut() {
                    capturer.stop().await;
                }
                self.state = LifecycleState::Stopped;
                return Err(e);
            }
        };

        let consumer = DetectionConsumer::new(classifier, self.config.detection.confidence_threshold);
        let capture_loop =
            PacedCaptureLoop::new(sources.webcam, sources.screen, Box::new(consumer), pacer);
        let handle = match CaptureLoopHandle::spawn(capture_loop) {
            Ok(handle) => handle,
            Err(e) => {
                if let Some(capturer) = self.capturer.as_mut() {
                    capturer.stop().await;
                }
                self.state = LifecycleState::Stopped;
                return Err(e);
            }
        };
        self.capture_loop = Some(handle);

        tracing::info!(epoch_wall = %clock.epoch_wall(), "Monitoring session started");
        self.clock = Some(clock);
        self.state = LifecycleState::Running;
        Ok(())
    }

    /// Stop the capture loop, then input capture, then release the devices.
    ///
    /// Returns the report on the first call after a successful start and
    /// `None` otherwise.
    pub async fn shutdown(&mut self) -> Option<SessionReport> {
        if !self.state.is_active() {
            return None;
        }
        self.state = LifecycleState::Stopping;
        tracing::info!("Stopping monitoring session");

        let mut stopped_loop = match self.capture_loop.as_mut() {
            Some(handle) => handle.stop().await,
            None => None,
        };
        let loop_stats = stopped_loop
            .as_ref()
            .map(PacedCaptureLoop::stats)
            .unwrap_or_default();

        let events_logged = match self.capturer.as_mut() {
            Some(capturer) => capturer.stop().await,
            None => None,
        };

        if let Some(capture_loop) = stopped_loop.as_mut() {
            capture_loop.release_sources();
        }

        let (duration, started_at) = match self.clock.as_ref() {
            Some(clock) => (clock.elapsed(), clock.epoch_wall().to_string()),
            None => (Duration::ZERO, String::new()),
        };
        self.state = LifecycleState::Stopped;

        let report = SessionReport {
            loop_stats,
            events_logged,
            duration,
            started_at,
        };
        tracing::info!(
            duration_secs = report.duration.as_secs_f64(),
            delivered = report.loop_stats.delivered,
            events = ?report.events_logged,
            "Monitoring session stopped"
        );
        Some(report)
    }
}
