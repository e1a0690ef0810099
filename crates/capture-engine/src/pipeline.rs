//! GStreamer pipelines that hand individual frames to the capture loop.
//!
//! Every pipeline ends in an `appsink` named `sink` that keeps only the most
//! recent buffer, so a slow consumer always reads a fresh frame instead of a
//! backlog.

use std::sync::OnceLock;
use std::time::Duration;

use examwatch_common::config::CaptureRegion;
use examwatch_common::error::{ExamwatchError, ExamwatchResult};
use examwatch_model::frame::RawFrame;
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

/// Appsink tail shared by every launch string.
const APPSINK: &str = "appsink name=sink max-buffers=1 drop=true sync=false";

/// A playing pipeline with an appsink to pull frames from.
pub struct GstFramePipeline {
    name: String,
    pipeline: gst::Pipeline,
    sink: gst_app::AppSink,
    failed: bool,
}

impl GstFramePipeline {
    pub fn from_launch(name: impl Into<String>, launch: &str) -> ExamwatchResult<Self> {
        init_gstreamer()?;

        let element = gst::parse::launch(launch)
            .map_err(|e| ExamwatchError::capture(format!("Failed to build pipeline: {e}")))?;

        let pipeline = element
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| ExamwatchError::capture("Launch string did not produce a pipeline"))?;

        let sink = pipeline
            .by_name("sink")
            .ok_or_else(|| ExamwatchError::capture("Pipeline has no element named 'sink'"))?
            .dynamic_cast::<gst_app::AppSink>()
            .map_err(|_| ExamwatchError::capture("Element 'sink' is not an appsink"))?;

        Ok(Self {
            name: name.into(),
            pipeline,
            sink,
            failed: false,
        })
    }

    /// Set the pipeline to Playing and wait for the source to open.
    pub fn start(&mut self) -> ExamwatchResult<()> {
        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            ExamwatchError::capture(format!("Failed to start {} pipeline: {e:?}", self.name))
        })?;

        // State changes are async; a source that cannot negotiate the
        // requested caps only reports it here.
        match self.pipeline.state(gst::ClockTime::from_seconds(5)) {
            (Ok(_), gst::State::Playing, _) => Ok(()),
            (Ok(_), state, _) => {
                tracing::debug!(pipeline = %self.name, ?state, "Pipeline not yet Playing");
                Ok(())
            }
            (Err(e), _, _) => {
                let _ = self.pipeline.set_state(gst::State::Null);
                Err(ExamwatchError::capture(format!(
                    "{} pipeline failed to reach Playing state: {e:?}",
                    self.name
                )))
            }
        }
    }

    /// Pull the latest frame, waiting at most `timeout`.
    ///
    /// `Ok(None)` means no frame arrived in time; an error means the pipeline
    /// produced a buffer it could not describe.
    pub fn pull_raw(&self, timeout: Duration) -> ExamwatchResult<Option<RawFrame>> {
        let timeout = gst::ClockTime::from_nseconds(timeout.as_nanos() as u64);
        let Some(sample) = self.sink.try_pull_sample(timeout) else {
            return Ok(None);
        };

        let caps = sample
            .caps()
            .ok_or_else(|| ExamwatchError::capture("Sample without caps"))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| ExamwatchError::capture(format!("Unreadable video caps: {e}")))?;

        let buffer = sample
            .buffer()
            .ok_or_else(|| ExamwatchError::capture("Sample without buffer"))?;
        let map = buffer
            .map_readable()
            .map_err(|e| ExamwatchError::capture(format!("Failed to map buffer: {e}")))?;

        raw_frame(&info, map.as_slice().to_vec()).map(Some)
    }

    /// False once the pipeline has posted an error or end-of-stream.
    pub fn is_healthy(&mut self) -> bool {
        if self.failed {
            return false;
        }
        let Some(bus) = self.pipeline.bus() else {
            return true;
        };
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos]) {
            match msg.view() {
                gst::MessageView::Error(e) => {
                    tracing::debug!(pipeline = %self.name, error = %e.error(), "Pipeline error");
                }
                _ => tracing::debug!(pipeline = %self.name, "Pipeline reached end of stream"),
            }
            self.failed = true;
        }
        !self.failed
    }

    /// Tear the pipeline down. Releases the underlying device.
    pub fn stop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(pipeline = %self.name, error = ?e, "Failed to stop pipeline");
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for GstFramePipeline {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Describe one mapped buffer using the negotiated caps.
///
/// The row stride comes from the caps, so padding after the last row does
/// not shift the rows.
fn raw_frame(info: &gst_video::VideoInfo, data: Vec<u8>) -> ExamwatchResult<RawFrame> {
    let channels = channels_for_format(info.format())?;
    let (width, height) = (info.width(), info.height());
    if width == 0 || height == 0 {
        return Err(ExamwatchError::capture(format!(
            "Invalid frame size {width}x{height}"
        )));
    }

    let row_bytes = width as usize * channels;
    let stride = info
        .stride()
        .first()
        .and_then(|s| usize::try_from(*s).ok())
        .filter(|s| *s >= row_bytes)
        .ok_or_else(|| ExamwatchError::capture("Caps describe an unusable row stride"))?;

    let needed = stride * (height as usize - 1) + row_bytes;
    if data.len() < needed {
        return Err(ExamwatchError::capture(format!(
            "Buffer holds {} bytes, frame needs {needed}",
            data.len()
        )));
    }

    Ok(RawFrame {
        width,
        height,
        channels,
        stride,
        data,
    })
}

fn channels_for_format(format: gst_video::VideoFormat) -> ExamwatchResult<usize> {
    match format {
        gst_video::VideoFormat::Bgr => Ok(3),
        gst_video::VideoFormat::Bgrx | gst_video::VideoFormat::Bgra => Ok(4),
        other => Err(ExamwatchError::capture(format!(
            "Unexpected pixel format {}",
            other.to_str()
        ))),
    }
}

/// Launch strings for the webcam at `index`, preferred resolution first.
///
/// The second candidate leaves the size to the device, so a camera that
/// cannot deliver the preferred resolution still opens.
pub fn webcam_launch_candidates(
    index: u32,
    preferred: Option<(u32, u32)>,
) -> ExamwatchResult<Vec<String>> {
    let source = webcam_source_element(index)?;
    let mut candidates = Vec::with_capacity(2);
    if let Some((width, height)) = preferred.filter(|(w, h)| *w > 0 && *h > 0) {
        candidates.push(format!(
            "{source} ! video/x-raw,width={width},height={height} ! videoconvert ! video/x-raw,format=BGR ! {APPSINK}"
        ));
    }
    candidates.push(format!(
        "{source} ! videoconvert ! video/x-raw,format=BGR ! {APPSINK}"
    ));
    Ok(candidates)
}

#[cfg(target_os = "linux")]
fn webcam_source_element(index: u32) -> ExamwatchResult<String> {
    Ok(format!("v4l2src device={}", webcam_device_node(index)))
}

#[cfg(target_os = "windows")]
fn webcam_source_element(index: u32) -> ExamwatchResult<String> {
    Ok(format!("ksvideosrc device-index={index}"))
}

#[cfg(target_os = "macos")]
fn webcam_source_element(index: u32) -> ExamwatchResult<String> {
    Ok(format!("avfvideosrc device-index={index}"))
}

#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
fn webcam_source_element(index: u32) -> ExamwatchResult<String> {
    Err(ExamwatchError::unsupported(format!(
        "Webcam {index}: no capture source for this platform"
    )))
}

/// Launch string that grabs `region` of the desktop as BGRx.
pub fn region_launch(region: &CaptureRegion) -> ExamwatchResult<String> {
    region.validate()?;
    let source = region_source_element(region)?;
    Ok(format!(
        "{source} ! videoconvert ! video/x-raw,format=BGRx ! {APPSINK}"
    ))
}

#[cfg(target_os = "linux")]
fn region_source_element(region: &CaptureRegion) -> ExamwatchResult<String> {
    Ok(format!(
        "ximagesrc use-damage=false show-pointer=true{}",
        x11_region_fragment(region)?
    ))
}

#[cfg(target_os = "windows")]
fn region_source_element(region: &CaptureRegion) -> ExamwatchResult<String> {
    Ok(format!(
        "d3d11screencapturesrc crop-x={} crop-y={} crop-width={} crop-height={} ! d3d11download",
        region.left, region.top, region.width, region.height
    ))
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn region_source_element(_region: &CaptureRegion) -> ExamwatchResult<String> {
    Err(ExamwatchError::unsupported(
        "Screen region capture is not available on this platform",
    ))
}

/// `ximagesrc` crop properties. End coordinates are inclusive.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn x11_region_fragment(region: &CaptureRegion) -> ExamwatchResult<String> {
    let CaptureRegion {
        left,
        top,
        width,
        height,
    } = *region;

    if width == 0 || height == 0 {
        return Err(ExamwatchError::capture(format!(
            "Invalid X11 capture region {width}x{height} at ({left},{top})"
        )));
    }

    let endx = left
        .checked_add(width - 1)
        .ok_or_else(|| ExamwatchError::capture("X11 capture region x-range overflow"))?;
    let endy = top
        .checked_add(height - 1)
        .ok_or_else(|| ExamwatchError::capture("X11 capture region y-range overflow"))?;

    Ok(format!(" startx={left} starty={top} endx={endx} endy={endy}"))
}

/// Device node for a numeric webcam index.
#[cfg(target_os = "linux")]
pub fn webcam_device_node(index: u32) -> String {
    format!("/dev/video{index}")
}

/// Kernel-reported name of the webcam at `index`, if the node exists.
#[cfg(target_os = "linux")]
pub fn webcam_device_name(index: u32) -> Option<String> {
    if !std::path::Path::new(&webcam_device_node(index)).exists() {
        return None;
    }
    let name = std::fs::read_to_string(format!("/sys/class/video4linux/video{index}/name"))
        .unwrap_or_default();
    let name = name.trim();
    Some(if name.is_empty() {
        webcam_device_node(index)
    } else {
        name.to_string()
    })
}

pub fn init_gstreamer() -> ExamwatchResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(ExamwatchError::capture(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}
