//! ExamWatch Data Model
//!
//! Defines the data contracts shared by the capture and logging paths:
//! - **Frames:** Timestamped BGR pixel buffers tagged with their source
//! - **Events:** Immutable keyboard and mouse-click records for the event log
//! - **Detections:** Output of the (external) frame classifier

pub mod detection;
pub mod event;
pub mod frame;

pub use detection::*;
pub use event::*;
pub use frame::*;
