//! Application configuration.
//!
//! Loaded once at process start and read-only afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ExamwatchError, ExamwatchResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Webcam and screen-region sampling.
    pub capture: CaptureConfig,

    /// Behavioral event log.
    pub event_log: EventLogConfig,

    /// Frame classifier.
    pub detection: DetectionConfig,

    /// Input hook settings.
    pub input: InputConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Capture parameters for both frame sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Index of the webcam device (e.g. 0 for `/dev/video0`).
    pub webcam_index: u32,

    /// Resolution requested from the webcam on first open. Best-effort.
    pub preferred_width: u32,
    pub preferred_height: u32,

    /// Upper bound on a single blocking device read.
    pub device_read_timeout_ms: u64,

    /// Minimum delay before retrying a device that failed to open.
    pub reopen_backoff_ms: u64,

    /// Screen rectangle to sample.
    pub region: CaptureRegion,

    /// Target capture cycles per second.
    pub target_fps: f64,
}

/// Screen rectangle in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Behavioral event log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// CSV file that input events are appended to.
    pub path: PathBuf,

    /// Interval at which the capturer checks for a stop request between events.
    pub keepalive_ms: u64,
}

/// Frame classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Path to the model weights.
    pub model_path: PathBuf,

    /// Minimum confidence for a detection to be kept.
    pub confidence_threshold: f32,
}

/// Input hook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Desktop size used to clamp pointer positions integrated from
    /// relative device motion.
    pub desktop_width: u32,
    pub desktop_height: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "examwatch=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            event_log: EventLogConfig::default(),
            detection: DetectionConfig::default(),
            input: InputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            webcam_index: 0,
            preferred_width: 640,
            preferred_height: 480,
            device_read_timeout_ms: 100,
            reopen_backoff_ms: 2000,
            region: CaptureRegion::default(),
            target_fps: 15.0,
        }
    }
}

impl Default for CaptureRegion {
    fn default() -> Self {
        Self {
            left: 100,
            top: 50,
            width: 1920,
            height: 1080,
        }
    }
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("raw_behavioral").join("behavioral_log.csv"),
            keepalive_ms: 1000,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: data_dir().join("models").join("yolov8n.onnx"),
            confidence_threshold: 0.55,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            desktop_width: 1920,
            desktop_height: 1080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl CaptureRegion {
    /// Check that the rectangle is non-empty.
    pub fn validate(&self) -> ExamwatchResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ExamwatchError::config(format!(
                "Invalid capture region {}x{} at ({},{})",
                self.width, self.height, self.left, self.top
            )));
        }
        Ok(())
    }

    /// Parse `left,top,width,height`.
    pub fn parse(value: &str) -> ExamwatchResult<Self> {
        let parts = value
            .split(',')
            .map(|part| part.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ExamwatchError::config(format!("Invalid capture region '{value}': {e}")))?;

        let &[left, top, width, height] = parts.as_slice() else {
            return Err(ExamwatchError::config(format!(
                "Capture region must be left,top,width,height; got '{value}'"
            )));
        };

        let region = Self {
            left,
            top,
            width,
            height,
        };
        region.validate()?;
        Ok(region)
    }
}

impl CaptureConfig {
    pub fn device_read_timeout(&self) -> Duration {
        Duration::from_millis(self.device_read_timeout_ms)
    }

    pub fn reopen_backoff(&self) -> Duration {
        Duration::from_millis(self.reopen_backoff_ms)
    }
}

impl EventLogConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_millis(self.keepalive_ms)
    }
}

impl AppConfig {
    /// Load config from `path` if it exists, otherwise use defaults.
    ///
    /// A file that exists but cannot be read or parsed also yields defaults,
    /// along with the error, so the caller can report it once logging is up.
    pub fn load_or_default(path: &Path) -> (Self, Option<ExamwatchError>) {
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load_from(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Load config from an explicit path. Missing or malformed files are errors.
    pub fn load_from(path: &Path) -> ExamwatchResult<Self> {
        if !path.exists() {
            return Err(ExamwatchError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to the standard location, returning the path written.
    pub fn save(&self) -> ExamwatchResult<PathBuf> {
        let config_path = config_file_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: &Path) -> ExamwatchResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check cross-field invariants before the pipeline starts.
    pub fn validate(&self) -> ExamwatchResult<()> {
        self.capture.region.validate()?;

        let fps = self.capture.target_fps;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ExamwatchError::config(format!(
                "target_fps must be a positive number, got {fps}"
            )));
        }

        let threshold = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ExamwatchError::config(format!(
                "confidence_threshold must be within [0, 1], got {threshold}"
            )));
        }

        if self.event_log.keepalive_ms == 0 {
            return Err(ExamwatchError::config("event_log.keepalive_ms must be > 0"));
        }

        if self.input.desktop_width == 0 || self.input.desktop_height == 0 {
            return Err(ExamwatchError::config("input desktop size must be non-zero"));
        }

        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("examwatch").join("config.json")
}

/// Default data directory for logs and models.
fn data_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("examwatch")
}
