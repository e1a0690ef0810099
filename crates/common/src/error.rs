//! Error types shared across ExamWatch crates.

use std::path::PathBuf;

/// Top-level error type for ExamWatch operations.
#[derive(Debug, thiserror::Error)]
pub enum ExamwatchError {
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Input tracking error: {message}")]
    InputTracking { message: String },

    #[error("Event log error: {message}")]
    EventLog { message: String },

    #[error("Classifier error: {message}")]
    Classifier { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ExamwatchError.
pub type ExamwatchResult<T> = Result<T, ExamwatchError>;

impl ExamwatchError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn input_tracking(msg: impl Into<String>) -> Self {
        Self::InputTracking {
            message: msg.into(),
        }
    }

    pub fn event_log(msg: impl Into<String>) -> Self {
        Self::EventLog {
            message: msg.into(),
        }
    }

    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}
