//! ExamWatch Common Utilities
//!
//! Shared infrastructure for all ExamWatch crates:
//! - Error types and result aliases
//! - Session clock and frame-rate pacing
//! - Cooperative stop tokens and the component lifecycle state machine
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use lifecycle::*;
