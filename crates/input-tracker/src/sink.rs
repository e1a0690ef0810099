//! Append-only CSV event log with per-event durability.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use examwatch_common::error::{ExamwatchError, ExamwatchResult};
use examwatch_model::event::{csv_header, InputEvent};

/// Writes input events to a CSV file in append mode.
///
/// Each row is written with a single write and synced to disk before
/// [`EventLogSink::append`] returns. The header row is written only when the
/// file is empty at open time, so reopening an existing log never repeats it.
pub struct EventLogSink {
    file: Option<File>,
    path: PathBuf,
    events_written: u64,
}

impl EventLogSink {
    /// Open (or create) the log at `path`, writing the header if the file is empty.
    pub fn open(path: impl Into<PathBuf>) -> ExamwatchResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ExamwatchError::event_log(format!(
                    "Failed to create log directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ExamwatchError::event_log(format!(
                    "Failed to open event log {}: {e}",
                    path.display()
                ))
            })?;

        let len = file.metadata()?.len();
        if len == 0 {
            write_line(&mut file, &csv_header())
                .map_err(|e| ExamwatchError::event_log(format!("Failed to write header: {e}")))?;
        }

        tracing::debug!(path = %path.display(), existing_bytes = len, "Event log opened");

        Ok(Self {
            file: Some(file),
            path,
            events_written: 0,
        })
    }

    /// Append one event. A no-op once the sink has been closed.
    pub fn append(&mut self, event: &InputEvent) -> ExamwatchResult<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        write_line(file, &event.to_csv_row())
            .map_err(|e| ExamwatchError::event_log(format!("Failed to write event: {e}")))?;
        self.events_written += 1;
        Ok(())
    }

    /// Sync and release the file handle. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_all() {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to sync event log on close");
            }
            tracing::debug!(
                path = %self.path.display(),
                events = self.events_written,
                "Event log closed"
            );
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Number of events appended through this handle.
    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EventLogSink {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_line(file: &mut File, row: &str) -> std::io::Result<()> {
    let mut line = String::with_capacity(row.len() + 1);
    line.push_str(row);
    line.push('\n');
    file.write_all(line.as_bytes())?;
    file.sync_data()
}
