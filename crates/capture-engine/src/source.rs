//! Frame sources polled by the capture loop.
//!
//! A source never fails: any device problem turns into "no frame this
//! cycle". The device is opened lazily on first use; after a failed open or
//! a broken handle the source waits out a backoff before opening again.

use std::time::{Duration, Instant};

use chrono::Local;

use examwatch_common::config::CaptureConfig;
use examwatch_model::frame::{Frame, FrameOrigin};

use crate::device::{CaptureDevice, GstCaptureDevice};

/// Non-blocking (bounded) single-frame acquisition from one device.
pub trait FrameSource: Send {
    /// One frame, or `None` if the device has nothing to give right now.
    fn try_acquire(&mut self) -> Option<Frame>;

    /// Release the device handle. Safe to call repeatedly or when never opened.
    fn release(&mut self);

    fn origin(&self) -> FrameOrigin;
}

/// Lazily-opened device plus its reopen schedule.
struct DeviceSlot {
    origin: FrameOrigin,
    device: Box<dyn CaptureDevice>,
    read_timeout: Duration,
    backoff: Duration,
    retry_at: Option<Instant>,
}

impl DeviceSlot {
    fn new(
        origin: FrameOrigin,
        device: Box<dyn CaptureDevice>,
        read_timeout: Duration,
        backoff: Duration,
    ) -> Self {
        Self {
            origin,
            device,
            read_timeout,
            backoff,
            retry_at: None,
        }
    }

    fn acquire(&mut self) -> Option<Frame> {
        if !self.device.is_open() && !self.try_open() {
            return None;
        }

        match self.device.read_frame(self.read_timeout) {
            Ok(Some(raw)) => match Frame::from_raw(self.origin, Local::now(), raw) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::trace!(source = %self.origin, error = %e, "Discarding malformed frame");
                    None
                }
            },
            Ok(None) => {
                tracing::trace!(source = %self.origin, "No frame ready");
                None
            }
            Err(e) => {
                tracing::debug!(
                    source = %self.origin,
                    device = %self.device.describe(),
                    error = %e,
                    "Capture device failed; will reopen"
                );
                self.device.close();
                self.retry_at = Some(Instant::now() + self.backoff);
                None
            }
        }
    }

    fn try_open(&mut self) -> bool {
        if self.retry_at.is_some_and(|at| Instant::now() < at) {
            return false;
        }
        match self.device.open() {
            Ok(()) => {
                self.retry_at = None;
                true
            }
            Err(e) => {
                tracing::debug!(
                    source = %self.origin,
                    device = %self.device.describe(),
                    error = %e,
                    retry_in_ms = self.backoff.as_millis() as u64,
                    "Capture device unavailable"
                );
                self.retry_at = Some(Instant::now() + self.backoff);
                false
            }
        }
    }

    fn release(&mut self) {
        self.device.close();
        self.retry_at = None;
    }
}

/// Local camera, opened by numeric index.
pub struct WebcamSource {
    slot: DeviceSlot,
}

impl WebcamSource {
    pub fn new(device: Box<dyn CaptureDevice>, read_timeout: Duration, backoff: Duration) -> Self {
        Self {
            slot: DeviceSlot::new(FrameOrigin::Webcam, device, read_timeout, backoff),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(
            Box::new(GstCaptureDevice::webcam(config)),
            config.device_read_timeout(),
            config.reopen_backoff(),
        )
    }
}

impl FrameSource for WebcamSource {
    fn try_acquire(&mut self) -> Option<Frame> {
        self.slot.acquire()
    }

    fn release(&mut self) {
        self.slot.release();
    }

    fn origin(&self) -> FrameOrigin {
        FrameOrigin::Webcam
    }
}

/// Fixed rectangle of the desktop, normalized to 3-channel BGR.
pub struct RegionCaptureSource {
    slot: DeviceSlot,
}

impl RegionCaptureSource {
    pub fn new(device: Box<dyn CaptureDevice>, read_timeout: Duration, backoff: Duration) -> Self {
        Self {
            slot: DeviceSlot::new(FrameOrigin::ScreenRegion, device, read_timeout, backoff),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(
            Box::new(GstCaptureDevice::screen_region(&config.region)),
            config.device_read_timeout(),
            config.reopen_backoff(),
        )
    }
}

impl FrameSource for RegionCaptureSource {
    fn try_acquire(&mut self) -> Option<Frame> {
        self.slot.acquire()
    }

    fn release(&mut self) {
        self.slot.release();
    }

    fn origin(&self) -> FrameOrigin {
        FrameOrigin::ScreenRegion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDevice, FakeRead};

    fn source(device: FakeDevice, backoff: Duration) -> RegionCaptureSource {
        RegionCaptureSource::new(Box::new(device), Duration::from_millis(5), backoff)
    }

    #[test]
    fn opens_lazily_and_reuses_the_handle() {
        let device = FakeDevice::new(vec![FakeRead::bgrx(4, 2), FakeRead::bgrx(4, 2)]);
        let stats = device.stats();
        let mut source = source(device, Duration::ZERO);
        assert_eq!(stats.opens(), 0);

        let frame = source.try_acquire().unwrap();
        assert_eq!(frame.origin(), FrameOrigin::ScreenRegion);
        assert_eq!(frame.data().len(), 4 * 2 * 3);
        assert!(source.try_acquire().is_some());

        assert_eq!(stats.opens(), 1);
    }

    #[test]
    fn webcam_frames_carry_webcam_origin() {
        let device = FakeDevice::new(vec![FakeRead::bgrx(3, 2)]);
        let stats = device.stats();
        let mut webcam = WebcamSource::new(Box::new(device), Duration::from_millis(5), Duration::ZERO);
        assert_eq!(webcam.origin(), FrameOrigin::Webcam);
        assert_eq!(stats.open_attempts(), 0);

        let frame = webcam.try_acquire().unwrap();
        assert_eq!(frame.origin(), FrameOrigin::Webcam);
        assert_eq!(frame.data().len(), 3 * 2 * 3);
        assert_eq!(stats.opens(), 1);

        webcam.release();
        assert_eq!(stats.closes(), 1);
    }

    #[test]
    fn empty_read_is_absent_without_side_effects() {
        let device = FakeDevice::new(vec![FakeRead::Empty, FakeRead::bgrx(2, 2)]);
        let stats = device.stats();
        let mut source = source(device, Duration::from_secs(60));

        assert!(source.try_acquire().is_none());
        assert!(source.try_acquire().is_some());
        assert_eq!(stats.opens(), 1);
        assert_eq!(stats.closes(), 0);
    }

    #[test]
    fn failed_open_waits_for_backoff() {
        let device = FakeDevice::new(vec![FakeRead::bgrx(2, 2)]).failing_opens(1);
        let stats = device.stats();
        let mut source = source(device, Duration::from_secs(60));

        assert!(source.try_acquire().is_none());
        assert!(source.try_acquire().is_none());
        assert_eq!(stats.open_attempts(), 1);
    }

    #[test]
    fn broken_handle_is_closed_and_reopened() {
        let device = FakeDevice::new(vec![FakeRead::Broken, FakeRead::bgrx(2, 2)]);
        let stats = device.stats();
        let mut source = source(device, Duration::ZERO);

        assert!(source.try_acquire().is_none());
        assert_eq!(stats.closes(), 1);
        assert!(source.try_acquire().is_some());
        assert_eq!(stats.opens(), 2);
    }

    #[test]
    fn release_is_idempotent_and_safe_when_never_opened() {
        let device = FakeDevice::new(vec![FakeRead::bgrx(2, 2)]);
        let stats = device.stats();
        let mut source = source(device, Duration::ZERO);

        source.release();
        assert_eq!(stats.closes(), 0);

        source.try_acquire();
        source.release();
        source.release();
        assert_eq!(stats.closes(), 1);
    }
}
