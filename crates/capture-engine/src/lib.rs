//! ExamWatch Capture Engine
//!
//! Samples a webcam and a fixed screen region at a target frame rate and
//! hands synchronized pairs to the frame classifier, while the input tracker
//! records keyboard and click events on its own schedule.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 MonitorSession                   │
//! │  ┌────────────────────────┐  ┌─────────────────┐ │
//! │  │    PacedCaptureLoop    │  │ InputEvent-     │ │
//! │  │ ┌────────┐ ┌─────────┐ │  │ Capturer        │ │
//! │  │ │ Webcam │ │ Region  │ │  │  (hook → sink)  │ │
//! │  │ └───┬────┘ └────┬────┘ │  └────────┬────────┘ │
//! │  │     └─────┬─────┘      │           │          │
//! │  │           ▼            │           ▼          │
//! │  │   DetectionConsumer    │  behavioral_log.csv  │
//! │  └────────────────────────┘                      │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod classifier;
pub mod device;
pub mod paced;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod testing;

pub use classifier::{ClassifierLoader, DetectionConsumer, FrameClassifier, WeightsFileLoader};
pub use device::{CaptureDevice, GstCaptureDevice};
pub use paced::{CaptureLoopHandle, CycleOutcome, FrameConsumer, LoopStats, PacedCaptureLoop};
pub use session::*;
pub use source::{FrameSource, RegionCaptureSource, WebcamSource};
