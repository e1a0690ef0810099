//! Input event records for the behavioral event log.
//!
//! Events are written once as comma-delimited rows and never mutated. Only
//! key transitions and mouse clicks are recorded; pointer motion is not.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Header row of the event log, in column order.
pub const EVENT_LOG_COLUMNS: [&str; 6] = [
    "timestamp",
    "event_type",
    "key_detail",
    "mouse_x",
    "mouse_y",
    "mouse_button",
];

/// `key_detail` value written for mouse-button rows.
const CLICK_DETAIL: &str = "click";

/// Timestamp format for log rows (microsecond precision).
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Kind of input transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    KeyPress,
    KeyRelease,
    MouseDown,
    MouseUp,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeyPress => "key_press",
            Self::KeyRelease => "key_release",
            Self::MouseDown => "mouse_down",
            Self::MouseUp => "mouse_up",
        }
    }

    pub fn is_mouse(self) -> bool {
        matches!(self, Self::MouseDown | Self::MouseUp)
    }
}

/// A single normalized keyboard or mouse-click occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    timestamp: DateTime<Local>,
    event_type: EventType,
    label: String,
    position: Option<(i32, i32)>,
}

impl InputEvent {
    /// Create a key press or release event.
    pub fn key(timestamp: DateTime<Local>, label: impl Into<String>, pressed: bool) -> Self {
        Self {
            timestamp,
            event_type: if pressed {
                EventType::KeyPress
            } else {
                EventType::KeyRelease
            },
            label: label.into(),
            position: None,
        }
    }

    /// Create a mouse button event at screen position `(x, y)`.
    pub fn click(
        timestamp: DateTime<Local>,
        button: impl Into<String>,
        pressed: bool,
        x: i32,
        y: i32,
    ) -> Self {
        Self {
            timestamp,
            event_type: if pressed {
                EventType::MouseDown
            } else {
                EventType::MouseUp
            },
            label: button.into(),
            position: Some((x, y)),
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Key name for keyboard events, button name for mouse events.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Screen position, present only for mouse events.
    pub fn position(&self) -> Option<(i32, i32)> {
        self.position
    }

    /// Encode as one log row (no trailing newline).
    pub fn to_csv_row(&self) -> String {
        let timestamp = self.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let (key_detail, button) = if self.event_type.is_mouse() {
            (CLICK_DETAIL, self.label.as_str())
        } else {
            (self.label.as_str(), "")
        };
        let (x, y) = match self.position {
            Some((x, y)) => (x.to_string(), y.to_string()),
            None => (String::new(), String::new()),
        };

        [
            timestamp.as_str(),
            self.event_type.as_str(),
            key_detail,
            &x,
            &y,
            button,
        ]
        .iter()
        .map(|field| escape_field(field))
        .collect::<Vec<_>>()
        .join(",")
    }
}

/// The event log header row (no trailing newline).
pub fn csv_header() -> String {
    EVENT_LOG_COLUMNS.join(",")
}

fn escape_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
