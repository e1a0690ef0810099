//! The paced dual-source capture loop.
//!
//! Each cycle acquires one frame from each source, delivers the pair only if
//! both are present, then sleeps out whatever is left of the frame budget.
//! The stop token is checked once per cycle, at the top.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use examwatch_common::clock::FramePacer;
use examwatch_common::error::{ExamwatchError, ExamwatchResult};
use examwatch_common::lifecycle::{LifecycleState, StopToken};
use examwatch_model::frame::Frame;

use crate::source::FrameSource;

/// Downstream receiver of synchronized frame pairs.
pub trait FrameConsumer: Send {
    fn deliver(&mut self, webcam: Frame, screen: Frame);
}

impl<F> FrameConsumer for F
where
    F: FnMut(Frame, Frame) + Send,
{
    fn deliver(&mut self, webcam: Frame, screen: Frame) {
        self(webcam, screen)
    }
}

/// Counters accumulated over the life of a loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub delivered: u64,
    pub skipped: u64,
    pub webcam_misses: u64,
    pub screen_misses: u64,
    /// Cycles whose work alone exceeded the frame budget.
    pub overruns: u64,
}

impl LoopStats {
    /// Delivered pairs per second over `elapsed`.
    pub fn effective_fps(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.delivered as f64 / secs
    }
}

/// Result of a single cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub delivered: bool,
    /// Time spent acquiring and delivering, before any pacing sleep.
    pub work: Duration,
    pub overrun: bool,
}

pub struct PacedCaptureLoop {
    webcam: Box<dyn FrameSource>,
    screen: Box<dyn FrameSource>,
    consumer: Box<dyn FrameConsumer>,
    pacer: FramePacer,
    stop: StopToken,
    stats: LoopStats,
}

impl PacedCaptureLoop {
    pub fn new(
        webcam: Box<dyn FrameSource>,
        screen: Box<dyn FrameSource>,
        consumer: Box<dyn FrameConsumer>,
        pacer: FramePacer,
    ) -> Self {
        Self {
            webcam,
            screen,
            consumer,
            pacer,
            stop: StopToken::new(),
            stats: LoopStats::default(),
        }
    }

    /// Token that ends [`PacedCaptureLoop::run`] at the next cycle boundary.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Run cycles until the stop token is set.
    pub fn run(&mut self) -> LoopStats {
        let started = Instant::now();
        tracing::info!(
            budget_ms = self.pacer.budget().as_secs_f64() * 1000.0,
            "Capture loop started"
        );

        while !self.stop.is_stopped() {
            self.run_cycle();
        }

        let elapsed = started.elapsed();
        tracing::info!(
            cycles = self.stats.cycles,
            delivered = self.stats.delivered,
            skipped = self.stats.skipped,
            webcam_misses = self.stats.webcam_misses,
            screen_misses = self.stats.screen_misses,
            overruns = self.stats.overruns,
            effective_fps = self.stats.effective_fps(elapsed),
            "Capture loop stopped"
        );
        self.stats
    }

    /// One acquire, deliver-or-skip, pace cycle.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let t0 = Instant::now();

        let webcam = self.webcam.try_acquire();
        let screen = self.screen.try_acquire();

        self.stats.cycles += 1;
        if webcam.is_none() {
            self.stats.webcam_misses += 1;
        }
        if screen.is_none() {
            self.stats.screen_misses += 1;
        }

        let delivered = match (webcam, screen) {
            (Some(webcam), Some(screen)) => {
                self.consumer.deliver(webcam, screen);
                self.stats.delivered += 1;
                true
            }
            _ => {
                self.stats.skipped += 1;
                false
            }
        };

        let work = t0.elapsed();
        let overrun = self.pacer.is_overrun(work);
        if overrun {
            self.stats.overruns += 1;
            tracing::trace!(work_ms = work.as_secs_f64() * 1000.0, "Capture cycle over budget");
        }
        if let Some(rest) = self.pacer.remaining(work) {
            std::thread::sleep(rest);
        }

        CycleOutcome {
            delivered,
            work,
            overrun,
        }
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Release both device handles.
    pub fn release_sources(&mut self) {
        self.webcam.release();
        self.screen.release();
    }
}

/// A capture loop running on a blocking thread.
pub struct CaptureLoopHandle {
    stop: StopToken,
    task: Option<JoinHandle<PacedCaptureLoop>>,
    state: LifecycleState,
}

impl CaptureLoopHandle {
    /// Move `capture_loop` onto tokio's blocking pool and start it.
    pub fn spawn(mut capture_loop: PacedCaptureLoop) -> ExamwatchResult<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ExamwatchError::capture(format!("Capture loop needs a tokio runtime: {e}"))
        })?;
        let stop = capture_loop.stop_token();
        let task = runtime.spawn_blocking(move || {
            capture_loop.run();
            capture_loop
        });
        Ok(Self {
            stop,
            task: Some(task),
            state: LifecycleState::Running,
        })
    }

    /// Signal stop and wait for the in-flight cycle to finish.
    ///
    /// Returns the stopped loop so its sources can be released, or `None` if
    /// already stopped.
    pub async fn stop(&mut self) -> Option<PacedCaptureLoop> {
        let task = self.task.take()?;
        self.state = LifecycleState::Stopping;
        self.stop.stop();

        let stopped = match task.await {
            Ok(capture_loop) => Some(capture_loop),
            Err(e) => {
                tracing::error!(error = %e, "Capture loop thread failed");
                None
            }
        };
        self.state = LifecycleState::Stopped;
        stopped
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }
}

impl Drop for CaptureLoopHandle {
    fn drop(&mut self) {
        // The detached thread finishes its cycle and drops the sources.
        self.stop.stop();
    }
}
