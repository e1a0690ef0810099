//! Frame classifier seam.
//!
//! The detection model is an external capability: it is loaded once before
//! the capture loop starts, and a failed load aborts the pipeline.

use std::path::{Path, PathBuf};

use examwatch_common::error::{ExamwatchError, ExamwatchResult};
use examwatch_model::detection::Detection;
use examwatch_model::frame::Frame;

use crate::paced::FrameConsumer;

/// A loaded detection model.
pub trait FrameClassifier: Send {
    fn classify(&mut self, frame: &Frame) -> ExamwatchResult<Vec<Detection>>;
}

/// Acquires a [`FrameClassifier`] from model weights on disk.
pub trait ClassifierLoader: Send {
    fn load(&self, model_path: &Path) -> ExamwatchResult<Box<dyn FrameClassifier>>;
}

/// Default loader: checks that the weights file exists and is non-empty.
///
/// The returned handle reports no detections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightsFileLoader;

impl ClassifierLoader for WeightsFileLoader {
    fn load(&self, model_path: &Path) -> ExamwatchResult<Box<dyn FrameClassifier>> {
        let metadata = std::fs::metadata(model_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExamwatchError::FileNotFound {
                    path: model_path.to_path_buf(),
                }
            } else {
                ExamwatchError::classifier(format!(
                    "Cannot read model {}: {e}",
                    model_path.display()
                ))
            }
        })?;

        if !metadata.is_file() || metadata.len() == 0 {
            return Err(ExamwatchError::classifier(format!(
                "Model {} is not a usable weights file",
                model_path.display()
            )));
        }

        tracing::info!(model = %model_path.display(), bytes = metadata.len(), "Classifier loaded");
        Ok(Box::new(WeightsOnlyClassifier {
            model: model_path.to_path_buf(),
        }))
    }
}

struct WeightsOnlyClassifier {
    model: PathBuf,
}

impl FrameClassifier for WeightsOnlyClassifier {
    fn classify(&mut self, frame: &Frame) -> ExamwatchResult<Vec<Detection>> {
        tracing::trace!(
            model = %self.model.display(),
            source = %frame.origin(),
            "Classifying frame"
        );
        Ok(Vec::new())
    }
}

/// Runs the classifier on every delivered pair and keeps confident detections.
pub struct DetectionConsumer {
    classifier: Box<dyn FrameClassifier>,
    threshold: f32,
    pairs: u64,
    detections: u64,
}

impl DetectionConsumer {
    pub fn new(classifier: Box<dyn FrameClassifier>, threshold: f32) -> Self {
        Self {
            classifier,
            threshold,
            pairs: 0,
            detections: 0,
        }
    }

    /// Detections at or above the threshold in one frame. Classifier errors
    /// count as no detections.
    fn confident(&mut self, frame: &Frame) -> Vec<Detection> {
        match self.classifier.classify(frame) {
            Ok(detections) => detections
                .into_iter()
                .filter(|d| d.is_confident(self.threshold))
                .collect(),
            Err(e) => {
                tracing::debug!(source = %frame.origin(), error = %e, "Classification failed");
                Vec::new()
            }
        }
    }

    pub fn pairs(&self) -> u64 {
        self.pairs
    }

    /// Confident detections across all pairs so far.
    pub fn detections(&self) -> u64 {
        self.detections
    }
}

impl FrameConsumer for DetectionConsumer {
    fn deliver(&mut self, webcam: Frame, screen: Frame) {
        let on_webcam = self.confident(&webcam);
        let on_screen = self.confident(&screen);
        self.pairs += 1;
        self.detections += (on_webcam.len() + on_screen.len()) as u64;

        if !on_webcam.is_empty() || !on_screen.is_empty() {
            tracing::debug!(
                webcam = ?on_webcam.iter().map(|d| d.label.as_str()).collect::<Vec<_>>(),
                screen = ?on_screen.iter().map(|d| d.label.as_str()).collect::<Vec<_>>(),
                "Detections"
            );
        }
    }
}
