//! Hardware-free stand-ins for the capture seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;

use examwatch_common::error::{ExamwatchError, ExamwatchResult};
use examwatch_model::frame::{Frame, FrameOrigin, RawFrame};

use crate::device::CaptureDevice;
use crate::source::FrameSource;

/// What a [`FakeDevice`] returns from one read.
#[derive(Debug, Clone)]
pub enum FakeRead {
    Frame(RawFrame),
    /// No data within the timeout.
    Empty,
    /// The handle broke.
    Broken,
}

impl FakeRead {
    /// A uniform BGRx frame, as a screen grabber would deliver it.
    pub fn bgrx(width: u32, height: u32) -> Self {
        let stride = width as usize * 4;
        Self::Frame(RawFrame {
            width,
            height,
            channels: 4,
            stride,
            data: vec![0x7f; stride * height as usize],
        })
    }
}

/// Shared open/close counters of a fake device or source.
#[derive(Debug, Clone, Default)]
pub struct DeviceStats {
    open_attempts: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl DeviceStats {
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Handles actually released (closing a closed device does not count).
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Scripted [`CaptureDevice`]. Reads past the end of the script are empty.
pub struct FakeDevice {
    script: VecDeque<FakeRead>,
    failing_opens: usize,
    open: bool,
    stats: DeviceStats,
}

impl FakeDevice {
    pub fn new(script: Vec<FakeRead>) -> Self {
        Self {
            script: script.into(),
            failing_opens: 0,
            open: false,
            stats: DeviceStats::default(),
        }
    }

    /// Make the first `count` open attempts fail.
    pub fn failing_opens(mut self, count: usize) -> Self {
        self.failing_opens = count;
        self
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats.clone()
    }
}

impl CaptureDevice for FakeDevice {
    fn open(&mut self) -> ExamwatchResult<()> {
        if self.open {
            return Err(ExamwatchError::capture("fake device already open"));
        }
        self.stats.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(ExamwatchError::capture("fake device busy"));
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self, _timeout: Duration) -> ExamwatchResult<Option<RawFrame>> {
        if !self.open {
            return Err(ExamwatchError::capture("fake device not open"));
        }
        match self.script.pop_front() {
            Some(FakeRead::Frame(raw)) => Ok(Some(raw)),
            Some(FakeRead::Empty) | None => Ok(None),
            Some(FakeRead::Broken) => Err(ExamwatchError::capture("fake device unplugged")),
        }
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

/// [`FrameSource`] that yields a frame or nothing according to a fixed
/// present/absent pattern, optionally taking time per call.
pub struct ScriptedSource {
    origin: FrameOrigin,
    pattern: VecDeque<bool>,
    repeat: Option<bool>,
    work: Duration,
    calls: Arc<AtomicUsize>,
    held: bool,
    stats: DeviceStats,
}

impl ScriptedSource {
    /// Follows `pattern`, then reports absent forever.
    pub fn from_pattern(origin: FrameOrigin, pattern: Vec<bool>) -> Self {
        Self {
            origin,
            pattern: pattern.into(),
            repeat: None,
            work: Duration::ZERO,
            calls: Arc::default(),
            held: false,
            stats: DeviceStats::default(),
        }
    }

    /// Always has a frame.
    pub fn always(origin: FrameOrigin) -> Self {
        let mut source = Self::from_pattern(origin, vec![]);
        source.repeat = Some(true);
        source
    }

    /// Never has a frame.
    pub fn never(origin: FrameOrigin) -> Self {
        let mut source = Self::from_pattern(origin, vec![]);
        source.repeat = Some(false);
        source
    }

    /// Block for `work` on every acquisition, like a slow device read.
    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    /// Number of `try_acquire` calls so far.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn try_acquire(&mut self) -> Option<Frame> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.held {
            self.held = true;
            self.stats.open_attempts.fetch_add(1, Ordering::SeqCst);
            self.stats.opens.fetch_add(1, Ordering::SeqCst);
        }
        if !self.work.is_zero() {
            std::thread::sleep(self.work);
        }

        let present = self
            .pattern
            .pop_front()
            .or(self.repeat)
            .unwrap_or(false);
        if !present {
            return None;
        }

        let raw = RawFrame {
            width: 2,
            height: 2,
            channels: 3,
            stride: 6,
            data: vec![0; 12],
        };
        Frame::from_raw(self.origin, Local::now(), raw).ok()
    }

    fn release(&mut self) {
        if self.held {
            self.held = false;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn origin(&self) -> FrameOrigin {
        self.origin
    }
}
