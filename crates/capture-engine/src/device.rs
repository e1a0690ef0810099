//! Capture devices: one exclusively-owned handle per physical source.

use std::time::Duration;

use examwatch_common::config::{CaptureConfig, CaptureRegion};
use examwatch_common::error::{ExamwatchError, ExamwatchResult};
use examwatch_model::frame::RawFrame;

use crate::pipeline::{region_launch, webcam_launch_candidates, GstFramePipeline};

/// An openable source of raw frames.
///
/// At most one handle is open at a time: opening an already-open device is
/// an error, not a reset.
pub trait CaptureDevice: Send {
    /// Acquire the OS/driver resource.
    fn open(&mut self) -> ExamwatchResult<()>;

    /// Read one frame, blocking for at most `timeout`.
    ///
    /// `Ok(None)` means no data was ready; an error means the handle is no
    /// longer usable and should be closed.
    fn read_frame(&mut self, timeout: Duration) -> ExamwatchResult<Option<RawFrame>>;

    /// Release the handle. Safe to call when not open.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Human-readable identity for logs.
    fn describe(&self) -> String;
}

/// A device backed by a GStreamer appsink pipeline.
pub struct GstCaptureDevice {
    name: String,
    candidates: Vec<String>,
    unavailable: Option<String>,
    pipeline: Option<GstFramePipeline>,
}

impl GstCaptureDevice {
    /// Create a device that tries each launch string in order on open.
    pub fn new(name: impl Into<String>, candidates: Vec<String>) -> Self {
        Self {
            name: name.into(),
            candidates,
            unavailable: None,
            pipeline: None,
        }
    }

    /// Webcam by numeric index, requesting the configured resolution.
    pub fn webcam(config: &CaptureConfig) -> Self {
        let name = format!("webcam-{}", config.webcam_index);
        let preferred = Some((config.preferred_width, config.preferred_height));
        match webcam_launch_candidates(config.webcam_index, preferred) {
            Ok(candidates) => Self::new(name, candidates),
            Err(e) => Self::unavailable(name, e),
        }
    }

    /// Fixed rectangle of the desktop.
    pub fn screen_region(region: &CaptureRegion) -> Self {
        let name = format!(
            "screen-{}x{}+{}+{}",
            region.width, region.height, region.left, region.top
        );
        match region_launch(region) {
            Ok(launch) => Self::new(name, vec![launch]),
            Err(e) => Self::unavailable(name, e),
        }
    }

    /// A device that can never open; every `open()` reports `reason`.
    fn unavailable(name: String, reason: ExamwatchError) -> Self {
        Self {
            name,
            candidates: Vec::new(),
            unavailable: Some(reason.to_string()),
            pipeline: None,
        }
    }
}

impl CaptureDevice for GstCaptureDevice {
    fn open(&mut self) -> ExamwatchResult<()> {
        if self.pipeline.is_some() {
            return Err(ExamwatchError::capture(format!(
                "{} is already open",
                self.name
            )));
        }
        if let Some(reason) = &self.unavailable {
            return Err(ExamwatchError::unsupported(reason.clone()));
        }

        let mut last_error = None;
        for launch in &self.candidates {
            tracing::debug!(device = %self.name, %launch, "Opening capture pipeline");
            let attempt = GstFramePipeline::from_launch(self.name.clone(), launch)
                .and_then(|mut pipeline| pipeline.start().map(|()| pipeline));
            match attempt {
                Ok(pipeline) => {
                    tracing::info!(device = %self.name, "Capture device opened");
                    self.pipeline = Some(pipeline);
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(device = %self.name, error = %e, "Launch candidate failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ExamwatchError::capture(format!("{} has no launch candidates", self.name))
        }))
    }

    fn read_frame(&mut self, timeout: Duration) -> ExamwatchResult<Option<RawFrame>> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Err(ExamwatchError::capture(format!("{} is not open", self.name)));
        };
        if !pipeline.is_healthy() {
            return Err(ExamwatchError::capture(format!(
                "{} pipeline stopped delivering",
                pipeline.name()
            )));
        }
        pipeline.pull_raw(timeout)
    }

    fn close(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
            tracing::info!(device = %self.name, "Capture device released");
        }
    }

    fn is_open(&self) -> bool {
        self.pipeline.is_some()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl Drop for GstCaptureDevice {
    fn drop(&mut self) {
        self.close();
    }
}
