//! Frame classifier output.

use serde::{Deserialize, Serialize};

/// One object found in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label (e.g. "person", "cell phone").
    pub label: String,

    /// Classifier confidence in `[0.0, 1.0]`.
    pub confidence: f32,

    /// Bounding box in frame pixels.
    pub bbox: BoundingBox,
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Detection {
    /// Whether this detection clears a confidence threshold (inclusive).
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}
